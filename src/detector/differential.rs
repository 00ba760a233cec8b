use crate::transport::ProbeResponse;
use crate::utils;

use super::{Finding, Severity};

pub const DEFAULT_FUZZ_PARAMS: &str = "admin=true&debug=1&test=true&role=admin";
pub const DEFAULT_SIZE_DEVIATION: f64 = 0.05;

/// The URL the mass-assignment probe re-requests, or `None` for static assets.
pub fn mass_assignment_url(url: &str, fuzz_params: &str) -> Option<String> {
    if utils::is_static_asset(url) || fuzz_params.trim().is_empty() {
        return None;
    }
    Some(utils::append_query(url, fuzz_params.trim_start_matches(['?', '&'])))
}

/// Compares the baseline and fuzzed responses of the same endpoint.
/// Both deviating at once is the strongest signal and is rated Critical.
pub fn check_mass_assignment(
    base: &ProbeResponse,
    fuzzed: &ProbeResponse,
    endpoint: &str,
    size_deviation: f64,
) -> Vec<Finding> {
    if utils::is_static_asset(endpoint) {
        return Vec::new();
    }

    let mut deviations = Vec::new();
    let status_changed = base.status != fuzzed.status;
    if status_changed {
        deviations.push(format!("status {} -> {}", base.status, fuzzed.status));
    }

    let ratio = size_ratio(base.size, fuzzed.size);
    let size_changed = ratio > size_deviation;
    if size_changed {
        deviations.push(format!(
            "size {} -> {} bytes ({:.1}%)",
            base.size,
            fuzzed.size,
            ratio * 100.0
        ));
    }

    if deviations.is_empty() {
        return Vec::new();
    }

    let severity = if status_changed && size_changed {
        Severity::Critical
    } else {
        Severity::High
    };
    vec![Finding::new(
        "Mass Assignment",
        endpoint,
        severity,
        format!(
            "privileged parameters changed the response: {}",
            deviations.join(", ")
        ),
    )]
}

fn size_ratio(base: usize, fuzzed: usize) -> f64 {
    let delta = (fuzzed as f64 - base as f64).abs();
    delta / (base.max(1) as f64)
}

/// Decremented-ID variants of `url`, one per positive numeric segment,
/// paired with the ID that was substituted in.
pub fn idor_candidates(url: &str) -> Vec<(String, u64)> {
    utils::numeric_segments(url)
        .into_iter()
        .filter(|(_, value)| *value > 0)
        .filter_map(|(idx, value)| {
            let target = value - 1;
            utils::replace_segment(url, idx, &target.to_string()).map(|u| (u, target))
        })
        .collect()
}

pub fn idor_finding(original: &str, candidate: &str, id: u64) -> Finding {
    Finding::new(
        "IDOR (Sequential ID)",
        candidate,
        Severity::High,
        format!("object {id} reachable by decrementing the ID in {original}"),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn response(status: u16, size: usize) -> ProbeResponse {
        ProbeResponse {
            url: "http://shop.test/api/profile".to_string(),
            status,
            body: "x".repeat(size),
            headers: HashMap::new(),
            size,
            latency: Duration::from_millis(5),
        }
    }

    #[test]
    fn large_size_jump_is_flagged_high() {
        let findings = check_mass_assignment(
            &response(200, 120),
            &response(200, 2120),
            "http://shop.test/api/profile",
            DEFAULT_SIZE_DEVIATION,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert!(findings[0].evidence.contains("size 120 -> 2120"));
    }

    #[test]
    fn one_byte_drift_is_ignored() {
        let findings = check_mass_assignment(
            &response(200, 120),
            &response(200, 121),
            "http://shop.test/api/profile",
            DEFAULT_SIZE_DEVIATION,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn status_and_size_change_is_critical() {
        let findings = check_mass_assignment(
            &response(200, 120),
            &response(403, 900),
            "http://shop.test/api/profile",
            DEFAULT_SIZE_DEVIATION,
        );
        assert_eq!(findings[0].severity, Severity::Critical);
        assert!(findings[0].evidence.contains("status 200 -> 403"));
    }

    #[test]
    fn static_assets_are_never_probed() {
        assert!(mass_assignment_url("http://shop.test/app.css", DEFAULT_FUZZ_PARAMS).is_none());
        let findings = check_mass_assignment(
            &response(200, 10),
            &response(500, 9000),
            "http://shop.test/logo.png",
            DEFAULT_SIZE_DEVIATION,
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn fuzz_params_extend_existing_query() {
        assert_eq!(
            mass_assignment_url("http://shop.test/api?x=1", "admin=true").as_deref(),
            Some("http://shop.test/api?x=1&admin=true")
        );
    }

    #[test]
    fn idor_candidates_decrement_each_numeric_segment() {
        let candidates = idor_candidates("http://shop.test/api/users/7/orders/5");
        assert_eq!(
            candidates,
            vec![
                ("http://shop.test/api/users/6/orders/5".to_string(), 6),
                ("http://shop.test/api/users/7/orders/4".to_string(), 4),
            ]
        );
    }

    #[test]
    fn zero_ids_have_no_predecessor() {
        assert!(idor_candidates("http://shop.test/api/orders/0").is_empty());
    }
}
