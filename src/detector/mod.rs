pub mod classifier;
pub mod differential;
pub mod headers;
pub mod injection;
pub mod pii;
pub mod soft404;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportError;

pub use classifier::{KeywordClassifier, PassthroughClassifier, ResponseClass, ResponseClassifier};
pub use soft404::Soft404Filter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized security finding. Created by a detector and never changed afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Endpoint")]
    pub endpoint: String,
    #[serde(rename = "Severity")]
    pub severity: Severity,
    #[serde(rename = "Evidence")]
    pub evidence: String,
}

impl Finding {
    pub fn new(
        kind: impl Into<String>,
        endpoint: impl Into<String>,
        severity: Severity,
        evidence: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            endpoint: endpoint.into(),
            severity,
            evidence: evidence.into(),
        }
    }
}

/// Why one probe step produced nothing.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("transient: {0}")]
    Transient(#[from] TransportError),

    #[error("{detector} could not parse response: {message}")]
    Parse {
        detector: &'static str,
        message: String,
    },

    #[error("fatal: {0}")]
    Fatal(String),
}

impl ProbeError {
    pub fn parse(detector: &'static str, message: impl Into<String>) -> Self {
        ProbeError::Parse {
            detector,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ProbeError::Fatal(_))
    }
}
