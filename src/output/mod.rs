use itertools::Itertools;

use crate::detector::Finding;
use crate::runner::ScanReport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format '{other}', expected text or json")),
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") || lower.ends_with(".log") {
        return Some(OutputFormat::Text);
    }
    None
}

pub fn format_finding(f: &Finding) -> String {
    format!("[{}] {} {} :: {}", f.severity, f.kind, f.endpoint, f.evidence)
}

/// One line per finding, most severe first, stable within a severity.
pub fn render_text(report: &ScanReport) -> Vec<u8> {
    let mut out = String::new();
    for f in report
        .findings
        .iter()
        .sorted_by(|a, b| b.severity.cmp(&a.severity))
    {
        out.push_str(&format_finding(f));
        out.push('\n');
    }
    out.into_bytes()
}

pub fn render_json(report: &ScanReport) -> Vec<u8> {
    serde_json::to_vec_pretty(report).unwrap_or_else(|_| b"{}\n".to_vec())
}

pub fn render(report: &ScanReport, format: OutputFormat) -> Vec<u8> {
    match format {
        OutputFormat::Text => render_text(report),
        OutputFormat::Json => render_json(report),
    }
}

/// Finding counts per severity, highest first, skipping empty buckets.
pub fn severity_summary(report: &ScanReport) -> String {
    report
        .findings
        .iter()
        .counts_by(|f| f.severity)
        .into_iter()
        .sorted_by(|a, b| b.0.cmp(&a.0))
        .map(|(severity, n)| format!("{severity}: {n}"))
        .join(", ")
}
