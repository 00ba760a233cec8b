use std::collections::HashSet;

use reqwest::Url;

const STATIC_EXTENSIONS: [&str; 11] = [
    ".js", ".css", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".woff", ".woff2", ".ico", ".map",
];

const API_MARKERS: [&str; 4] = ["/api/", "/graphql", "/rest/", "/json"];

/// Returns `scheme://host[:port]` for a URL, the unit every work item is scoped to.
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return None;
    }
    Some(origin.ascii_serialization())
}

pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

pub fn in_scope(url: &str, origin: &str) -> bool {
    match origin_of(url) {
        Some(o) => o == origin,
        None => false,
    }
}

pub fn join_url(base: &str, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty()
        || reference.starts_with('#')
        || reference.starts_with("javascript:")
        || reference.starts_with("mailto:")
        || reference.starts_with("data:")
    {
        return None;
    }
    let base = Url::parse(base).ok()?;
    let mut joined = base.join(reference).ok()?;
    joined.set_fragment(None);
    match joined.scheme() {
        "http" | "https" => Some(joined.to_string()),
        _ => None,
    }
}

// appends a raw query fragment, picking `?` or `&` the way a browser would.
pub fn append_query(url: &str, query: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

/// Adds one form-encoded `key=value` pair to the URL's query string.
pub fn with_query_param(url: &str, key: &str, value: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.query_pairs_mut().append_pair(key, value);
    Some(parsed.to_string())
}

pub fn url_path(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default()
}

pub fn is_static_asset(url: &str) -> bool {
    let path = url_path(url).to_ascii_lowercase();
    STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

pub fn is_script_path(url: &str) -> bool {
    let path = url_path(url).to_ascii_lowercase();
    path.ends_with(".js") || path.ends_with(".mjs")
}

pub fn has_api_marker(url: &str) -> bool {
    let path = url_path(url).to_ascii_lowercase();
    if API_MARKERS.iter().any(|m| path.contains(m)) {
        return true;
    }
    path.split('/').any(|seg| {
        seg.len() >= 2
            && seg.starts_with('v')
            && seg[1..].chars().all(|c| c.is_ascii_digit())
    })
}

/// Every numeric path segment as `(segment index, value)`.
pub fn numeric_segments(url: &str) -> Vec<(usize, u64)> {
    let Ok(parsed) = Url::parse(url) else {
        return Vec::new();
    };
    let Some(segments) = parsed.path_segments() else {
        return Vec::new();
    };
    segments
        .enumerate()
        .filter_map(|(idx, seg)| {
            if seg.is_empty() || !seg.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            seg.parse::<u64>().ok().map(|v| (idx, v))
        })
        .collect()
}

pub fn replace_segment(url: &str, index: usize, value: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let mut segments: Vec<String> = parsed.path_segments()?.map(|s| s.to_string()).collect();
    let slot = segments.get_mut(index)?;
    *slot = value.to_string();
    parsed.set_path(&format!("/{}", segments.join("/")));
    Some(parsed.to_string())
}

pub fn parse_csv_list(value: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for part in value.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        if seen.insert(item.to_string()) {
            out.push(item.to_string());
        }
    }
    out
}

pub fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max).collect();
    out.push_str("...");
    out
}
