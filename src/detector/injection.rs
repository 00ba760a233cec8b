use std::sync::OnceLock;

use regex::Regex;

use super::{Finding, Severity};

pub const SQLI_PAYLOAD: &str = "' OR 1=1 --";
pub const XSS_CANARY: &str = r#""><script>confirm(1337)</script>"#;

const SQL_ERROR_SIGNATURES: [&str; 8] = [
    r"(?i)(SQL syntax.*MySQL|Warning.*mysql_.*|valid MySQL result|MySqlClient\.)",
    r"(?i)(PostgreSQL.*ERROR|Warning.*\Wpg_.*|valid PostgreSQL result|Npgsql\.)",
    r"(?i)(Driver.* SQL[\-_ ]*Server|ODBC SQL.*Driver|SQLServer JDBC Driver|SQLServerException)",
    r"(?i)(ORA-\d{5}|Oracle error|Oracle.*Driver|Warning.*\Woci_.*|Warning.*\Wora_.*)",
    r"(?i)(Microsoft Access Driver|JET Database Engine|Access Database Engine)",
    r"(?i)(SQLite/JDBCDriver|SQLite\.Exception|System\.Data\.SQLite\.SQLiteException)",
    r"(?i)(Sybase message|Sybase.*Server message|SybSQLException|TDS error)",
    r"(?i)(Syntax error in SQL statement|You have an error in your SQL syntax)",
];

fn sql_error_bank() -> &'static [Regex] {
    static BANK: OnceLock<Vec<Regex>> = OnceLock::new();
    BANK.get_or_init(|| {
        SQL_ERROR_SIGNATURES
            .iter()
            .map(|p| Regex::new(p).expect("sql signature regex"))
            .collect()
    })
}

/// One hit is enough to flag the endpoint.
pub fn check_sql_errors(body: &str, endpoint: &str, payload: &str) -> Vec<Finding> {
    for re in sql_error_bank() {
        if let Some(m) = re.find(body) {
            return vec![Finding::new(
                "SQL Injection",
                endpoint,
                Severity::Critical,
                format!(
                    "payload {:?} triggered database error: {}",
                    payload,
                    crate::utils::truncate_chars(m.as_str(), 100)
                ),
            )];
        }
    }
    Vec::new()
}

pub fn check_xss_reflection(body: &str, endpoint: &str) -> Vec<Finding> {
    if !body.contains(XSS_CANARY) {
        return Vec::new();
    }
    vec![Finding::new(
        "Reflected XSS",
        endpoint,
        Severity::High,
        format!("canary {XSS_CANARY} reflected unescaped in response"),
    )]
}
