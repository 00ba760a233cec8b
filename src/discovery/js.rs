use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::detector::{Finding, ProbeError, Severity};
use crate::transport::{ProbeResponse, Transport};
use crate::utils;

pub const DEFAULT_MIN_SECRET_ENTROPY: f64 = 3.5;

// (source-path fragment, what it indicates)
const VULNERABLE_LIBRARIES: [(&str, &str); 8] = [
    ("angular.js", "AngularJS 1.x (end of life)"),
    ("angularjs", "AngularJS 1.x (end of life)"),
    ("jquery-1.", "jQuery 1.x (prototype pollution, XSS)"),
    ("jquery-2.", "jQuery 2.x (XSS in htmlPrefilter)"),
    ("lodash-3.", "lodash 3.x (prototype pollution)"),
    ("handlebars-4.0", "Handlebars 4.0 (template injection)"),
    ("bootstrap-3.", "Bootstrap 3.x (XSS in data attributes)"),
    ("node_modules/moment/", "moment.js (ReDoS, unmaintained)"),
];

const SENSITIVE_SOURCE_FRAGMENTS: [&str; 9] = [
    ".env",
    "config",
    "secret",
    "credential",
    "password",
    "private",
    "api_key",
    "apikey",
    ".pem",
];

struct Patterns {
    source_map: Regex,
    aws_key: Regex,
    stripe_key: Regex,
    generic_key: Regex,
    api_path: Regex,
    base_url: Regex,
    get_call: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        source_map: Regex::new(r"//[#@]\s*sourceMappingURL=(\S+)").expect("source map regex"),
        aws_key: Regex::new(r"\bAKIA[0-9A-Z]{16}\b").expect("aws key regex"),
        stripe_key: Regex::new(r"\bsk_live_[0-9a-zA-Z]{24,}").expect("stripe key regex"),
        generic_key: Regex::new(r#"(?i)\bapi[_-]?key["']?\s*[:=]\s*["']([^"'\s]{8,})["']"#)
            .expect("api key regex"),
        api_path: Regex::new(r#"["'`](/api/v\d+/[A-Za-z0-9_\-./{}:]*)["'`]"#)
            .expect("api path regex"),
        base_url: Regex::new(
            r#"\b(?:BASE_URL|baseUrl|API_URL|apiUrl|baseURL)\s*[:=]\s*["'`]([^"'`\s]+)["'`]"#,
        )
        .expect("base url regex"),
        get_call: Regex::new(r#"\.get\(\s*["'`]([^"'`\s]+)["'`]"#).expect("get call regex"),
    })
}

/// Shannon entropy of a string in bits per byte.
pub fn shannon_entropy(value: &str) -> f64 {
    let data = value.as_bytes();
    if data.is_empty() {
        return 0.0;
    }

    let mut frequencies = [0u32; 256];
    for &b in data {
        frequencies[b as usize] += 1;
    }

    let len = data.len() as f64;
    frequencies
        .iter()
        .filter(|&&n| n > 0)
        .map(|&n| {
            let p = n as f64 / len;
            -p * p.log2()
        })
        .sum()
}

pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(6).collect();
    format!("{prefix}****")
}

/// Absolute URL of the last `sourceMappingURL` comment in a script.
pub fn source_map_reference(script_url: &str, body: &str) -> Option<String> {
    let reference = patterns()
        .source_map
        .captures_iter(body)
        .last()
        .and_then(|c| c.get(1))?;
    utils::join_url(script_url, reference.as_str())
}

#[derive(Debug, Deserialize)]
struct SourceMap {
    #[serde(default)]
    sources: Vec<String>,
}

/// Findings derived from the `sources` list of a fetched source map.
pub fn analyze_source_map(map_url: &str, body: &str) -> Result<Vec<Finding>, ProbeError> {
    let map: SourceMap = serde_json::from_str(body)
        .map_err(|e| ProbeError::parse("source-map", e.to_string()))?;

    let mut findings = Vec::new();
    for source in &map.sources {
        let lower = source.to_lowercase();
        if let Some((_, label)) = VULNERABLE_LIBRARIES
            .iter()
            .find(|(fragment, _)| lower.contains(fragment))
        {
            findings.push(Finding::new(
                "Vulnerable Library in Source Map",
                map_url,
                Severity::Medium,
                format!("{source}: {label}"),
            ));
        } else if SENSITIVE_SOURCE_FRAGMENTS.iter().any(|f| lower.contains(f)) {
            findings.push(Finding::new(
                "Sensitive File in Source Map",
                map_url,
                Severity::Low,
                format!("original source {source} is published"),
            ));
        }
    }
    Ok(findings)
}

/// Fetches a referenced source map. A map that is reachable is a finding by
/// itself; an unparsable one only loses the per-source findings.
pub async fn probe_source_map(
    transport: &Transport,
    map_url: &str,
) -> Result<Vec<Finding>, ProbeError> {
    let resp = transport.get(map_url).await?;
    if !resp.is_ok() {
        return Ok(Vec::new());
    }

    let mut findings = vec![Finding::new(
        "Source Map Exposed",
        map_url,
        Severity::Low,
        format!("source map served ({} bytes)", resp.size),
    )];
    match analyze_source_map(map_url, &resp.body) {
        Ok(more) => findings.extend(more),
        Err(e) => debug!("{e}"),
    }
    Ok(findings)
}

/// Secret-shaped literals whose entropy clears `min_entropy`.
pub fn scan_secrets(body: &str, endpoint: &str, min_entropy: f64) -> Vec<Finding> {
    let p = patterns();
    let mut candidates: Vec<(&str, &str)> = Vec::new();
    for m in p.aws_key.find_iter(body) {
        candidates.push(("AWS access key", m.as_str()));
    }
    for m in p.stripe_key.find_iter(body) {
        candidates.push(("Stripe live key", m.as_str()));
    }
    for c in p.generic_key.captures_iter(body) {
        if let Some(value) = c.get(1) {
            candidates.push(("API key", value.as_str()));
        }
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|(_, secret)| seen.insert(*secret))
        .filter(|(_, secret)| shannon_entropy(secret) >= min_entropy)
        .map(|(label, secret)| {
            Finding::new(
                "Hardcoded Secret",
                endpoint,
                Severity::Critical,
                format!(
                    "{label} {} (entropy {:.2})",
                    redact(secret),
                    shannon_entropy(secret)
                ),
            )
        })
        .collect()
}

/// Endpoint literals found in a script, resolved against its URL.
pub fn extract_endpoints(script_url: &str, body: &str) -> Vec<String> {
    let p = patterns();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for re in [&p.api_path, &p.base_url, &p.get_call] {
        for c in re.captures_iter(body) {
            let Some(raw) = c.get(1) else { continue };
            let Some(url) = utils::join_url(script_url, raw.as_str()) else {
                continue;
            };
            if seen.insert(url.clone()) {
                out.push(url);
            }
        }
    }
    out
}

#[derive(Debug, Default)]
pub struct ScriptIntel {
    pub findings: Vec<Finding>,
    pub endpoints: Vec<String>,
    pub source_map: Option<String>,
}

/// Everything that can be read from the script body alone, no extra requests.
pub fn inspect_script(resp: &ProbeResponse, min_entropy: f64) -> ScriptIntel {
    ScriptIntel {
        findings: scan_secrets(&resp.body, &resp.url, min_entropy),
        endpoints: extract_endpoints(&resp.url, &resp.body),
        source_map: source_map_reference(&resp.url, &resp.body),
    }
}
