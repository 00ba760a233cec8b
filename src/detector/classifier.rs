use std::sync::OnceLock;

use regex::Regex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseClass {
    WafBlock,
    GenericError,
    GenericSuccess,
}

/// Labels a response body. The label is reported, it never decides which probes run.
pub trait ResponseClassifier: Send + Sync + std::fmt::Debug {
    fn classify(&self, body: &str) -> ResponseClass;
}

const WAF_KEYWORDS: [&str; 10] = [
    "blocked",
    "forbidden",
    "waf",
    "firewall",
    "security",
    "attack",
    "malicious",
    "denied",
    "captcha",
    "challenge",
];

const ERROR_KEYWORDS: [&str; 4] = ["404", "missing", "moved", "oops"];
const ERROR_PHRASES: [&str; 2] = ["not found", "doesn't exist"];

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").expect("word regex"))
}

/// Keyword voting: WAF wording has to outnumber not-found wording to win.
#[derive(Clone, Debug, Default)]
pub struct KeywordClassifier;

impl ResponseClassifier for KeywordClassifier {
    fn classify(&self, body: &str) -> ResponseClass {
        let lower = body.to_lowercase();
        let mut waf_score = 0usize;
        let mut error_score = ERROR_PHRASES
            .iter()
            .map(|p| lower.matches(p).count())
            .sum::<usize>();

        for word in word_re().find_iter(&lower).map(|m| m.as_str()) {
            if WAF_KEYWORDS.contains(&word) {
                waf_score += 1;
            }
            if ERROR_KEYWORDS.contains(&word) {
                error_score += 1;
            }
        }

        if waf_score > 0 && waf_score > error_score {
            ResponseClass::WafBlock
        } else if error_score > 0 {
            ResponseClass::GenericError
        } else {
            ResponseClass::GenericSuccess
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PassthroughClassifier;

impl ResponseClassifier for PassthroughClassifier {
    fn classify(&self, _body: &str) -> ResponseClass {
        ResponseClass::GenericSuccess
    }
}
