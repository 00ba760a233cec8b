use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};

const USER_AGENTS: [&str; 6] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

const ACCEPT_LANGUAGES: [&str; 4] = [
    "en-US,en;q=0.9",
    "en-GB,en;q=0.8",
    "en-US,en;q=0.7,de;q=0.3",
    "en;q=0.9,fr;q=0.5",
];

const ACCEPT_VALUE: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

// a browser-like header set, re-rolled for every request.
pub fn random_headers() -> HeaderMap {
    let mut rng = rand::thread_rng();
    let mut headers = HeaderMap::new();
    let agent = USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0]);
    let language = ACCEPT_LANGUAGES
        .choose(&mut rng)
        .copied()
        .unwrap_or(ACCEPT_LANGUAGES[0]);
    headers.insert(USER_AGENT, HeaderValue::from_static(agent));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(language));
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
    headers
}

/// Layers caller-supplied headers over the random set. Invalid pairs are dropped.
pub fn merge_headers(mut base: HeaderMap, extra: &[(String, String)]) -> HeaderMap {
    for (k, v) in extra {
        let Ok(name) = HeaderName::from_bytes(k.trim().as_bytes()) else {
            continue;
        };
        let Ok(value) = HeaderValue::from_str(v.trim()) else {
            continue;
        };
        base.insert(name, value);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_headers_use_known_agents() {
        let headers = random_headers();
        let agent = headers.get(USER_AGENT).unwrap().to_str().unwrap();
        assert!(USER_AGENTS.contains(&agent));
        assert!(headers.contains_key(ACCEPT_LANGUAGE));
    }

    #[test]
    fn explicit_headers_override_random_ones() {
        let merged = merge_headers(
            random_headers(),
            &[
                ("User-Agent".to_string(), "probe/1.0".to_string()),
                ("bad header".to_string(), "x".to_string()),
            ],
        );
        assert_eq!(merged.get(USER_AGENT).unwrap(), "probe/1.0");
        assert_eq!(merged.len(), 3);
    }
}
