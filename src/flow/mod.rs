use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detector::{Finding, Severity};
use crate::transport::{ProbeResponse, Transport};
use crate::utils;

pub const DEFAULT_MAX_STEPS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowPhase {
    Login,
    Register,
    Checkout,
    Submit,
}

impl FlowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowPhase::Login => "Login",
            FlowPhase::Register => "Register",
            FlowPhase::Checkout => "Checkout",
            FlowPhase::Submit => "Submit",
        }
    }
}

/// Reward per flow phase. Unmatched candidates are worth 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowRewards {
    pub login: i64,
    pub register: i64,
    pub checkout: i64,
    pub submit: i64,
}

impl Default for FlowRewards {
    fn default() -> Self {
        Self {
            login: 10,
            register: 20,
            checkout: 100,
            submit: 50,
        }
    }
}

impl FlowRewards {
    pub fn reward(&self, phase: Option<FlowPhase>) -> i64 {
        match phase {
            Some(FlowPhase::Login) => self.login,
            Some(FlowPhase::Register) => self.register,
            Some(FlowPhase::Checkout) => self.checkout,
            Some(FlowPhase::Submit) => self.submit,
            None => 0,
        }
    }
}

fn phase_patterns() -> &'static [(FlowPhase, Regex)] {
    static PATTERNS: OnceLock<Vec<(FlowPhase, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (FlowPhase::Login, r"(?i)login|sign.?in|user|auth"),
            (FlowPhase::Register, r"(?i)register|sign.?up|create.?account"),
            (FlowPhase::Checkout, r"(?i)checkout|buy|purchase|payment"),
            (FlowPhase::Submit, r"(?i)submit|save|update|apply"),
        ]
        .into_iter()
        .map(|(phase, p)| (phase, Regex::new(p).expect("flow phase regex")))
        .collect()
    })
}

/// First phase whose pattern matches the element markup or its target URL.
pub fn classify(markup: &str, url: &str) -> Option<FlowPhase> {
    phase_patterns()
        .iter()
        .find(|(_, re)| re.is_match(markup) || re.is_match(url))
        .map(|(phase, _)| *phase)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub url: String,
    pub phase: Option<FlowPhase>,
}

/// Forms (`action`) plus anchors and buttons (`href`) on a page, in document order.
pub fn candidates(page_url: &str, html: &str) -> Vec<Candidate> {
    static SELECTORS: OnceLock<(Selector, Selector)> = OnceLock::new();
    let (forms, links) = SELECTORS.get_or_init(|| {
        (
            Selector::parse("form[action]").expect("form selector"),
            Selector::parse("a[href], button[href]").expect("link selector"),
        )
    });

    let document = Html::parse_document(html);
    let mut out = Vec::new();
    let targets = document
        .select(forms)
        .filter_map(|el| el.value().attr("action").map(|a| (el, a)))
        .chain(
            document
                .select(links)
                .filter_map(|el| el.value().attr("href").map(|h| (el, h))),
        );
    for (element, reference) in targets {
        let Some(url) = utils::join_url(page_url, reference) else {
            continue;
        };
        let phase = classify(&element.html(), &url);
        out.push(Candidate { url, phase });
    }
    out
}

#[derive(Clone, Debug)]
pub struct FlowConfig {
    pub max_steps: usize,
    pub rewards: FlowRewards,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            rewards: FlowRewards::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FlowOutcome {
    pub findings: Vec<Finding>,
    /// URLs the walk moved to, in order.
    pub reached: Vec<String>,
    /// Responses fetched for `reached`, so callers need not request them again.
    pub pages: Vec<ProbeResponse>,
    pub total_reward: i64,
}

/// Fetches `start` and walks on from it. See [`explore_from`].
pub async fn explore(transport: &Transport, start: &str, config: &FlowConfig) -> FlowOutcome {
    match transport.get(start).await {
        Ok(first) => explore_from(transport, start, &first, config).await,
        Err(e) => {
            debug!("flow stopped at {}: {}", start, e);
            FlowOutcome::default()
        }
    }
}

/// Greedy walk from an already fetched `first` page: on each page follow the
/// unvisited, in-scope candidate with the highest reward, earliest candidate
/// winning ties.
pub async fn explore_from(
    transport: &Transport,
    start: &str,
    first: &ProbeResponse,
    config: &FlowConfig,
) -> FlowOutcome {
    let mut outcome = FlowOutcome::default();
    let Some(origin) = utils::origin_of(start) else {
        return outcome;
    };
    if !first.is_ok() {
        debug!("flow stopped at {} (status {})", start, first.status);
        return outcome;
    }

    let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
    let mut current = start.to_string();
    let mut body = first.body.clone();
    let mut transitions = 0usize;

    while transitions < config.max_steps {
        let mut best: Option<(Candidate, i64)> = None;
        for candidate in candidates(&current, &body) {
            if visited.contains(&candidate.url) || !utils::in_scope(&candidate.url, &origin) {
                continue;
            }
            let reward = config.rewards.reward(candidate.phase);
            if best.as_ref().map_or(true, |(_, r)| reward > *r) {
                best = Some((candidate, reward));
            }
        }
        let Some((next, reward)) = best else {
            break;
        };

        let action = next.phase.map(|p| p.as_str()).unwrap_or("Unknown");
        outcome.findings.push(Finding::new(
            "State Transition",
            current.as_str(),
            Severity::Info,
            format!("Selected Action: {action} (Reward: {reward}) -> {}", next.url),
        ));
        outcome.total_reward += reward;
        visited.insert(next.url.clone());
        outcome.reached.push(next.url.clone());
        current = next.url;
        transitions += 1;

        match transport.get(&current).await {
            Ok(resp) => {
                let ok = resp.is_ok();
                if ok {
                    body = resp.body.clone();
                } else {
                    debug!("flow stopped at {} (status {})", current, resp.status);
                }
                outcome.pages.push(resp);
                if !ok {
                    break;
                }
            }
            Err(e) => {
                debug!("flow stopped at {}: {}", current, e);
                break;
            }
        }
    }

    if transitions > 1 {
        outcome.findings.push(Finding::new(
            "Deep State Flow",
            start,
            Severity::Low,
            format!(
                "accrued {} reward over {} steps",
                outcome.total_reward, transitions
            ),
        ));
    }
    outcome
}
