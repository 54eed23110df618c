//! Approximate request matcher.
//!
//! Scoring is modeled as a pipeline of contribution functions per §9's design
//! note: each dimension either disqualifies the candidate outright or adds
//! points, and the highest total wins. Keeping each dimension as its own
//! function makes the table in the matching contract testable one row at a
//! time instead of as one large conditional.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::{Body, RecordedEntry, RequestRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Exact,
    Smart,
    Fuzzy,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Smart
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(Strategy::Exact),
            "smart" => Ok(Strategy::Smart),
            "fuzzy" => Ok(Strategy::Fuzzy),
            other => Err(format!("unknown matching strategy: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub strategy: Strategy,
    pub ignored_headers: BTreeSet<String>,
    pub ignored_query_params: BTreeSet<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        let ignored_headers = [
            "authorization",
            "cookie",
            "x-request-id",
            "x-correlation-id",
            "date",
            "user-agent",
            "host",
            "content-length",
            "connection",
            "accept-encoding",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        Self {
            strategy: Strategy::Smart,
            ignored_headers,
            ignored_query_params: BTreeSet::new(),
        }
    }
}

enum Contribution {
    Disqualify,
    Add(f64),
}

/// Recognizes all-digit, canonical-UUID, 24-hex, and 21-char nanoid-style
/// path segments as plausible identifiers.
pub fn is_id_like(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    if segment.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if is_uuid(segment) {
        return true;
    }
    if segment.len() == 24 && segment.chars().all(|c| c.is_ascii_hexdigit()) {
        return true;
    }
    if segment.len() == 21
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return true;
    }
    false
}

fn is_uuid(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 5 {
        return false;
    }
    let expected = [8, 4, 4, 4, 12];
    parts
        .iter()
        .zip(expected)
        .all(|(p, len)| p.len() == len && p.chars().all(|c| c.is_ascii_hexdigit()))
}

fn split_segments(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect()
}

fn method_contribution(live: &RequestRecord, candidate: &RequestRecord) -> Contribution {
    if live.method.eq_ignore_ascii_case(&candidate.method) {
        Contribution::Add(100.0)
    } else {
        Contribution::Disqualify
    }
}

fn path_contribution(live: &RequestRecord, candidate: &RequestRecord, strategy: Strategy) -> Contribution {
    if live.path == candidate.path {
        return Contribution::Add(100.0);
    }
    match strategy {
        Strategy::Exact => Contribution::Disqualify,
        Strategy::Smart => {
            let live_segs = split_segments(&live.path);
            let cand_segs = split_segments(&candidate.path);
            if live_segs.len() != cand_segs.len() {
                return Contribution::Disqualify;
            }
            for (l, c) in live_segs.iter().zip(cand_segs.iter()) {
                if l == c {
                    continue;
                }
                if is_id_like(l) && is_id_like(c) {
                    continue;
                }
                return Contribution::Disqualify;
            }
            Contribution::Add(90.0)
        }
        Strategy::Fuzzy => {
            let live_segs = split_segments(&live.path);
            let cand_segs = split_segments(&candidate.path);
            if live_segs.len() != cand_segs.len() {
                return Contribution::Disqualify;
            }
            if live_segs.is_empty() {
                return Contribution::Add(80.0);
            }
            let mut matched = 0usize;
            for (l, c) in live_segs.iter().zip(cand_segs.iter()) {
                if l == c {
                    matched += 1;
                } else if is_id_like(l) && is_id_like(c) {
                    matched += 1;
                } else {
                    return Contribution::Disqualify;
                }
            }
            Contribution::Add((matched as f64 / live_segs.len() as f64) * 80.0)
        }
    }
}

fn ratio_contribution<'a>(
    live_keys: impl Iterator<Item = &'a String>,
    cand_keys: impl Iterator<Item = &'a String>,
    live_map: &BTreeMap<String, String>,
    cand_map: &BTreeMap<String, String>,
    ignored: &BTreeSet<String>,
    weight: f64,
) -> f64 {
    let live_set: BTreeSet<String> = live_keys
        .filter(|k| !ignored.contains(k.as_str()))
        .cloned()
        .collect();
    let cand_set: BTreeSet<String> = cand_keys
        .filter(|k| !ignored.contains(k.as_str()))
        .cloned()
        .collect();
    let union: BTreeSet<&String> = live_set.union(&cand_set).collect();
    if union.is_empty() {
        return 0.0;
    }
    let matching = live_set
        .iter()
        .filter(|k| cand_set.contains(*k) && live_map.get(*k) == cand_map.get(*k))
        .count();
    (matching as f64 / union.len() as f64) * weight
}

fn query_contribution(live: &RequestRecord, candidate: &RequestRecord, cfg: &MatcherConfig) -> f64 {
    ratio_contribution(
        live.query.keys(),
        candidate.query.keys(),
        &live.query,
        &candidate.query,
        &cfg.ignored_query_params,
        50.0,
    )
}

fn header_contribution(live: &RequestRecord, candidate: &RequestRecord, cfg: &MatcherConfig) -> f64 {
    let ignored: BTreeSet<String> = cfg
        .ignored_headers
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    ratio_contribution(
        live.headers.keys(),
        candidate.headers.keys(),
        &live.headers,
        &candidate.headers,
        &ignored,
        30.0,
    )
}

fn body_contribution(live: &RequestRecord, candidate: &RequestRecord) -> f64 {
    let method = live.method.to_ascii_uppercase();
    if !matches!(method.as_str(), "POST" | "PUT" | "PATCH") {
        return 0.0;
    }
    if live.body == candidate.body {
        return 50.0;
    }
    if let (Body::Json(serde_json::Value::Object(l)), Body::Json(serde_json::Value::Object(c))) =
        (&live.body, &candidate.body)
    {
        let max_keys = l.len().max(c.len());
        if max_keys == 0 {
            return 0.0;
        }
        let common = l.keys().filter(|k| c.contains_key(*k)).count();
        return (common as f64 / max_keys as f64) * 30.0;
    }
    0.0
}

/// Scores one candidate against the live request; `None` means disqualified.
pub fn score(live: &RequestRecord, candidate: &RequestRecord, cfg: &MatcherConfig) -> Option<f64> {
    let mut total = 0.0;
    match method_contribution(live, candidate) {
        Contribution::Disqualify => return None,
        Contribution::Add(n) => total += n,
    }
    match path_contribution(live, candidate, cfg.strategy) {
        Contribution::Disqualify => return None,
        Contribution::Add(n) => total += n,
    }
    total += query_contribution(live, candidate, cfg);
    total += header_contribution(live, candidate, cfg);
    total += body_contribution(live, candidate);
    Some(total)
}

/// Returns the single highest-scoring entry, preserving input order on ties
/// (a stable comparison is used, so callers that want most-recent-wins must
/// pre-sort candidates by `created_at` descending, as storage's `list()` does).
pub fn find_best<'a>(
    live: &RequestRecord,
    candidates: &'a [RecordedEntry],
    cfg: &MatcherConfig,
) -> Option<&'a RecordedEntry> {
    if candidates.is_empty() {
        return None;
    }
    let mut best: Option<(&RecordedEntry, f64)> = None;
    for entry in candidates {
        if let Some(s) = score(live, &entry.request, cfg) {
            match &best {
                Some((_, best_score)) if *best_score >= s => {}
                _ => best = Some((entry, s)),
            }
        }
    }
    best.map(|(e, _)| e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::generate_id;

    fn req(method: &str, path: &str) -> RequestRecord {
        RequestRecord {
            method: method.to_string(),
            url: path.to_string(),
            path: path.to_string(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: Body::Absent,
            id: generate_id(),
            captured_at: 0,
        }
    }

    #[test]
    fn id_like_recognizes_digits_uuid_hex_nanoid() {
        assert!(is_id_like("12345"));
        assert!(is_id_like("550e8400-e29b-41d4-a716-446655440000"));
        assert!(is_id_like("507f1f77bcf86cd799439011"));
        assert!(is_id_like("V1StGXR8_Z5jdHi6B-myT"));
        assert!(!is_id_like("hello"));
    }

    #[test]
    fn method_mismatch_always_disqualifies() {
        let cfg = MatcherConfig::default();
        let live = req("GET", "/api/users/1");
        let candidate = req("POST", "/api/users/1");
        assert_eq!(score(&live, &candidate, &cfg), None);
    }

    #[test]
    fn exact_strategy_requires_identical_path() {
        let mut cfg = MatcherConfig::default();
        cfg.strategy = Strategy::Exact;
        let live = req("GET", "/api/users/123");
        let candidate = req("GET", "/api/users/999");
        assert_eq!(score(&live, &candidate, &cfg), None);
    }

    #[test]
    fn smart_strategy_matches_id_drift() {
        let cfg = MatcherConfig::default();
        let live = req("GET", "/api/users/999");
        let candidate = req("GET", "/api/users/123");
        assert_eq!(score(&live, &candidate, &cfg), Some(190.0));
    }

    #[test]
    fn empty_candidates_return_none() {
        let cfg = MatcherConfig::default();
        let live = req("GET", "/x");
        assert!(find_best(&live, &[], &cfg).is_none());
    }
}
