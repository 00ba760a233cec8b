use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Node};

pub const DEFAULT_TOP_WORDS: usize = 15;
pub const EXPANSION_FACTOR: usize = 5;

const STOP_WORDS: [&str; 30] = [
    "the", "and", "contact", "login", "copyright", "privacy", "policy", "terms", "about", "home",
    "sign", "out", "all", "rights", "reserved", "support", "email", "phone", "address", "sitemap",
    "search", "menu", "with", "this", "that", "your", "from", "have", "more", "here",
];

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z]{4,}").expect("word regex"))
}

/// Visible text of a page: every text node outside `script`/`style`.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .map(|name| matches!(name, "script" | "style" | "noscript" | "template"))
            .unwrap_or(false);
        if hidden {
            continue;
        }
        out.push_str(text);
        out.push(' ');
    }
    out
}

/// The `top_n` most frequent non-stop words, most frequent first.
/// Equal counts keep the order in which the words first appeared.
pub fn top_words(text: &str, top_n: usize) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, m) in word_re().find_iter(&lower).enumerate() {
        let word = m.as_str();
        if STOP_WORDS.contains(&word) {
            continue;
        }
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(w, (count, first))| (w, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(top_n)
        .map(|(w, _, _)| w.to_string())
        .collect()
}

pub fn expand(word: &str) -> [String; EXPANSION_FACTOR] {
    [
        word.to_string(),
        format!("{word}s"),
        format!("get{word}"),
        format!("{word}-details"),
        format!("{word}_list"),
    ]
}

/// Endpoint-name guesses derived from a landing page's vocabulary.
pub fn generate_wordlist(html: &str, top_n: usize) -> Vec<String> {
    if html.trim().is_empty() || top_n == 0 {
        return Vec::new();
    }
    let words = top_words(&visible_text(html), top_n);

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(words.len() * EXPANSION_FACTOR);
    for word in &words {
        for guess in expand(word) {
            if seen.insert(guess.clone()) {
                out.push(guess);
            }
        }
    }
    out
}

/// Joins every guess under every prefix, e.g. `/api/` + `invoices` on the origin.
pub fn guess_urls(origin: &str, prefixes: &[String], guesses: &[String]) -> Vec<String> {
    let origin = origin.trim_end_matches('/');
    let mut out = Vec::with_capacity(prefixes.len() * guesses.len());
    for prefix in prefixes {
        let prefix = format!("/{}/", prefix.trim_matches('/'));
        let prefix = prefix.replace("//", "/");
        for guess in guesses {
            out.push(format!("{origin}{prefix}{guess}"));
        }
    }
    out
}
