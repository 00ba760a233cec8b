pub mod js;

use serde_json::Value;
use tracing::{debug, info};

use crate::detector::{Finding, ProbeError, Severity};
use crate::transport::Transport;
use crate::utils;

pub const DEFAULT_HISTORY_INDEX: &str = "http://web.archive.org/cdx/search/cdx";
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// Paths worth probing on every target, with the severity of finding them open.
pub const SENSITIVE_PATHS: [(&str, Severity); 6] = [
    ("/.env", Severity::Critical),
    ("/.git/config", Severity::Critical),
    ("/backup", Severity::High),
    ("/config", Severity::High),
    ("/admin", Severity::Medium),
    ("/robots.txt", Severity::Low),
];

pub fn sensitive_path_urls(origin: &str) -> Vec<String> {
    let origin = origin.trim_end_matches('/');
    SENSITIVE_PATHS
        .iter()
        .map(|(path, _)| format!("{origin}{path}"))
        .collect()
}

/// Finding for a sensitive path that answered with real content.
pub fn sensitive_path_finding(url: &str, size: usize) -> Option<Finding> {
    let path = utils::url_path(url);
    SENSITIVE_PATHS
        .iter()
        .find(|(p, _)| *p == path)
        .map(|(p, severity)| {
            Finding::new(
                "Sensitive File Found",
                url,
                *severity,
                format!("{p} is publicly readable ({size} bytes)"),
            )
        })
}

pub fn history_query_url(index: &str, host: &str, limit: usize) -> String {
    format!(
        "{index}?url={host}/*&output=json&fl=original,mimetype&filter=statuscode:200&collapse=urlkey&limit={limit}"
    )
}

/// Keeps captures that look like API traffic rather than static assets.
pub fn is_interesting_capture(url: &str, mimetype: &str) -> bool {
    mimetype.to_ascii_lowercase().contains("json") || utils::has_api_marker(url)
}

/// Parses the index's JSON row format; the first row is a header.
pub fn parse_history(body: &str) -> Result<Vec<String>, ProbeError> {
    let rows: Vec<Vec<Value>> =
        serde_json::from_str(body).map_err(|e| ProbeError::parse("history", e.to_string()))?;

    let mut urls = Vec::new();
    for row in rows.iter().skip(1) {
        let Some(original) = row.first().and_then(Value::as_str) else {
            continue;
        };
        let mimetype = row.get(1).and_then(Value::as_str).unwrap_or("");
        if is_interesting_capture(original, mimetype) && !urls.iter().any(|u| u == original) {
            urls.push(original.to_string());
        }
    }
    Ok(urls)
}

/// Historical API-looking URLs for the target's host.
pub async fn mine_history(
    transport: &Transport,
    target: &str,
    index: &str,
    limit: usize,
) -> Result<Vec<String>, ProbeError> {
    let host = utils::host_of(target)
        .ok_or_else(|| ProbeError::parse("history", format!("no host in {target}")))?;
    let query = history_query_url(index, &host, limit);
    debug!("querying history index: {}", query);

    let resp = transport.fetch_external(&query).await?;
    if !resp.is_ok() {
        return Err(ProbeError::parse(
            "history",
            format!("index answered with status {}", resp.status),
        ));
    }
    let urls = parse_history(&resp.body)?;
    info!("history index returned {} candidate URLs for {}", urls.len(), host);
    Ok(urls)
}
