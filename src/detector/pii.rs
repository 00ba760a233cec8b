use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use super::{Finding, Severity};

// addresses containing any of these are expected to be public
const IGNORED_EMAIL_FRAGMENTS: [&str; 8] = [
    "support@",
    "contact@",
    "info@",
    "admin@",
    "help@",
    "noreply@",
    "test@",
    "example.com",
];

struct Patterns {
    email: Regex,
    ssn: Regex,
    stack_trace: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        email: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex"),
        ssn: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn regex"),
        stack_trace: Regex::new(
            r"(?i)(Traceback \(most recent call last\)|SQLSTATE|Syntax error|at line \d+|\bat [\w$.]+\([\w]+\.java:\d+\))",
        )
        .expect("stack trace regex"),
    })
}

fn is_ignored_email(email: &str) -> bool {
    let lower = email.to_lowercase();
    IGNORED_EMAIL_FRAGMENTS.iter().any(|f| lower.contains(f))
}

pub fn scan(body: &str, endpoint: &str) -> Vec<Finding> {
    let p = patterns();
    let mut findings = Vec::new();

    let mut seen: HashSet<&str> = HashSet::new();
    for m in p.email.find_iter(body) {
        let email = m.as_str();
        if is_ignored_email(email) || !seen.insert(email) {
            continue;
        }
        findings.push(Finding::new(
            "PII Leak (Email)",
            endpoint,
            Severity::High,
            email,
        ));
    }

    let ssn_count = p.ssn.find_iter(body).count();
    if ssn_count > 0 {
        findings.push(Finding::new(
            "PII Leak (SSN)",
            endpoint,
            Severity::Critical,
            format!("Found {ssn_count} SSN patterns (redacted)"),
        ));
    }

    if let Some(m) = p.stack_trace.find(body) {
        findings.push(Finding::new(
            "Debug Trace Leak",
            endpoint,
            Severity::Medium,
            format!(
                "Server stack trace exposed: {}",
                crate::utils::truncate_chars(m.as_str(), 80)
            ),
        ));
    }

    findings
}
