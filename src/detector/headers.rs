use crate::transport::ProbeResponse;

use super::{Finding, Severity};

pub const UNSAFE_METHODS: [&str; 4] = ["OPTIONS", "PUT", "DELETE", "TRACE"];

const REQUIRED_HEADERS: [(&str, &str, Severity); 4] = [
    ("content-security-policy", "Content-Security-Policy", Severity::High),
    ("strict-transport-security", "Strict-Transport-Security", Severity::High),
    ("x-frame-options", "X-Frame-Options", Severity::Medium),
    ("x-content-type-options", "X-Content-Type-Options", Severity::Medium),
];

/// Security-header audit, run once against the landing page.
pub fn audit_security_headers(resp: &ProbeResponse, endpoint: &str) -> Vec<Finding> {
    let mut findings: Vec<Finding> = REQUIRED_HEADERS
        .iter()
        .filter(|(key, _, _)| resp.header(key).is_none())
        .map(|(_, display, severity)| {
            Finding::new(
                format!("Missing Security Header: {display}"),
                endpoint,
                *severity,
                format!("response did not set {display}"),
            )
        })
        .collect();

    if let Some(server) = resp.header("server").filter(|s| !s.trim().is_empty()) {
        findings.push(Finding::new(
            "Server Info Leak",
            endpoint,
            Severity::Low,
            format!("Server: {server}"),
        ));
    }

    findings
}

// anything below 405 other than 404 means the server accepted the verb
pub fn check_method_response(method: &str, status: u16, endpoint: &str) -> Option<Finding> {
    if status >= 405 || status == 404 {
        return None;
    }
    Some(Finding::new(
        format!("Unsafe Method Enabled: {method}"),
        endpoint,
        Severity::Medium,
        format!("{method} answered with status {status}"),
    ))
}
