use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

pub const DEFAULT_HAMMING_THRESHOLD: u32 = 3;
pub const DEFAULT_JACCARD_THRESHOLD: f64 = 0.85;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").expect("token regex"))
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    token_re()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
}

fn token_hash(token: &str) -> u64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(buf)
}

/// 64-bit SimHash: every token votes on every bit, a bit is set where the vote
/// ends up positive. Small textual edits move only a few bits.
pub fn simhash(text: &str) -> u64 {
    let mut votes = [0i64; 64];
    for token in tokenize(text) {
        let h = token_hash(&token);
        for (bit, vote) in votes.iter_mut().enumerate() {
            if (h >> bit) & 1 == 1 {
                *vote += 1;
            } else {
                *vote -= 1;
            }
        }
    }
    votes
        .iter()
        .enumerate()
        .filter(|(_, v)| **v > 0)
        .fold(0u64, |acc, (bit, _)| acc | (1u64 << bit))
}

pub fn tokens(text: &str) -> HashSet<String> {
    tokenize(text).collect()
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[derive(Clone, Debug)]
pub struct Baseline {
    pub hash: u64,
    pub tokens: HashSet<String>,
}

/// Rejects 200 responses that are really the site's not-found page.
/// The baseline is learned once per scan; until then nothing is filtered.
#[derive(Debug)]
pub struct Soft404Filter {
    baseline: OnceLock<Baseline>,
    hamming_threshold: u32,
    jaccard_threshold: f64,
}

impl Default for Soft404Filter {
    fn default() -> Self {
        Self::new(DEFAULT_HAMMING_THRESHOLD, DEFAULT_JACCARD_THRESHOLD)
    }
}

impl Soft404Filter {
    pub fn new(hamming_threshold: u32, jaccard_threshold: f64) -> Self {
        Self {
            baseline: OnceLock::new(),
            hamming_threshold,
            jaccard_threshold,
        }
    }

    /// Returns false when a baseline was already set.
    pub fn calibrate(&self, body: &str) -> bool {
        self.baseline
            .set(Baseline {
                hash: simhash(body),
                tokens: tokens(body),
            })
            .is_ok()
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.get()
    }

    pub fn is_calibrated(&self) -> bool {
        self.baseline.get().is_some()
    }

    pub fn is_soft_404(&self, body: &str) -> bool {
        let Some(baseline) = self.baseline.get() else {
            return false;
        };

        if hamming_distance(baseline.hash, simhash(body)) < self.hamming_threshold {
            return true;
        }

        let current = tokens(body);
        if current.is_empty() || baseline.tokens.is_empty() {
            return false;
        }
        jaccard(&baseline.tokens, &current) > self.jaccard_threshold
    }
}
