//! Chaos injector: two independent sub-engines (latency, error injection)
//! sharing one rule-dispatch shape and one stats block.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::pattern::Pattern;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LatencyConfig {
    pub min: u64,
    pub max: u64,
}

impl LatencyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min > self.max {
            return Err(format!(
                "latency min ({}) must be <= max ({})",
                self.min, self.max
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorInjectionConfig {
    pub rate: f64,
    pub status: u16,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl ErrorInjectionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.rate) {
            return Err(format!("error rate {} out of range 0..=100", self.rate));
        }
        if !(400..=599).contains(&self.status) {
            return Err(format!("error status {} out of range 400..=599", self.status));
        }
        Ok(())
    }
}

pub struct ChaosRule<T> {
    pub id: u64,
    pub method: String,
    pub pattern: Pattern,
    pub enabled: bool,
    pub payload: T,
}

impl<T> ChaosRule<T> {
    fn matches(&self, method: &str, path: &str) -> bool {
        self.enabled
            && (self.method == "*" || self.method.eq_ignore_ascii_case(method))
            && self.pattern.matches(path).is_some()
    }
}

#[derive(Default)]
pub struct ChaosStats {
    requests_processed: AtomicU64,
    errors_injected: AtomicU64,
    total_latency_added_ms: AtomicU64,
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosStatsSnapshot {
    pub requests_processed: u64,
    pub errors_injected: u64,
    pub total_latency_added_ms: u64,
    #[serde(rename = "averageLatency")]
    pub average_latency_ms: f64,
}

impl ChaosStats {
    fn snapshot(&self) -> ChaosStatsSnapshot {
        let processed = self.requests_processed.load(Ordering::Relaxed);
        let total = self.total_latency_added_ms.load(Ordering::Relaxed);
        let average = if processed > 0 {
            total as f64 / processed as f64
        } else {
            0.0
        };
        ChaosStatsSnapshot {
            requests_processed: processed,
            errors_injected: self.errors_injected.load(Ordering::Relaxed),
            total_latency_added_ms: total,
            average_latency_ms: average,
        }
    }
}

pub(crate) fn status_text(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Error",
    }
}

pub struct InjectedError {
    pub status: u16,
    pub body: serde_json::Value,
}

pub struct ChaosOutcome {
    pub delay_ms: u64,
    pub error: Option<InjectedError>,
}

pub struct ChaosEngine {
    enabled: AtomicBool,
    latency_default: RwLock<Option<LatencyConfig>>,
    latency_rules: RwLock<Vec<ChaosRule<LatencyConfig>>>,
    error_default: RwLock<Option<ErrorInjectionConfig>>,
    error_rules: RwLock<Vec<ChaosRule<ErrorInjectionConfig>>>,
    next_id: AtomicU64,
    stats: ChaosStats,
}

impl Default for ChaosEngine {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            latency_default: RwLock::new(None),
            latency_rules: RwLock::new(Vec::new()),
            error_default: RwLock::new(None),
            error_rules: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            stats: ChaosStats::default(),
        }
    }
}

impl ChaosEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_default_latency(&self, cfg: Option<LatencyConfig>) {
        *self.latency_default.write() = cfg;
    }

    pub fn set_default_error(&self, cfg: Option<ErrorInjectionConfig>) {
        *self.error_default.write() = cfg;
    }

    pub fn add_latency_rule(&self, method: String, pattern: Pattern, cfg: LatencyConfig) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.latency_rules.write().push(ChaosRule {
            id,
            method,
            pattern,
            enabled: true,
            payload: cfg,
        });
        id
    }

    pub fn add_error_rule(&self, method: String, pattern: Pattern, cfg: ErrorInjectionConfig) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.error_rules.write().push(ChaosRule {
            id,
            method,
            pattern,
            enabled: true,
            payload: cfg,
        });
        id
    }

    pub fn stats(&self) -> ChaosStatsSnapshot {
        self.stats.snapshot()
    }

    fn resolve_latency(&self, method: &str, path: &str) -> Option<LatencyConfig> {
        let rules = self.latency_rules.read();
        if let Some(rule) = rules.iter().find(|r| r.matches(method, path)) {
            return Some(rule.payload);
        }
        *self.latency_default.read()
    }

    fn resolve_error(&self, method: &str, path: &str) -> Option<ErrorInjectionConfig> {
        let rules = self.error_rules.read();
        if let Some(rule) = rules.iter().find(|r| r.matches(method, path)) {
            return Some(rule.payload.clone());
        }
        self.error_default.read().clone()
    }

    /// Draws latency and an error decision for one request, sleeping for the
    /// drawn delay before returning. A no-op (and stats-neutral) when disabled.
    pub async fn apply(&self, method: &str, path: &str) -> ChaosOutcome {
        if !self.enabled() {
            return ChaosOutcome {
                delay_ms: 0,
                error: None,
            };
        }

        let delay_ms = match self.resolve_latency(method, path) {
            Some(cfg) => {
                let delay = if cfg.min == cfg.max {
                    cfg.min
                } else {
                    rand::thread_rng().gen_range(cfg.min..=cfg.max)
                };
                if delay > 0 {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                delay
            }
            None => 0,
        };

        let error = match self.resolve_error(method, path) {
            Some(cfg) => {
                let sample: f64 = rand::thread_rng().gen_range(0.0..100.0);
                if sample < cfg.rate {
                    let mut body = serde_json::json!({
                        "error": status_text(cfg.status),
                        "message": cfg.message,
                        "injected": true,
                    });
                    if let Some(details) = cfg.details {
                        body["details"] = details;
                    }
                    Some(InjectedError {
                        status: cfg.status,
                        body,
                    })
                } else {
                    None
                }
            }
            None => None,
        };

        self.stats.requests_processed.fetch_add(1, Ordering::Relaxed);
        if delay_ms > 0 {
            self.stats
                .total_latency_added_ms
                .fetch_add(delay_ms, Ordering::Relaxed);
        }
        if error.is_some() {
            self.stats.errors_injected.fetch_add(1, Ordering::Relaxed);
        }

        ChaosOutcome { delay_ms, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_engine_is_a_stats_neutral_noop() {
        let engine = ChaosEngine::new();
        engine.set_default_latency(Some(LatencyConfig { min: 50, max: 50 }));
        let outcome = engine.apply("GET", "/x").await;
        assert_eq!(outcome.delay_ms, 0);
        assert!(outcome.error.is_none());
        assert_eq!(engine.stats().requests_processed, 0);
    }

    #[tokio::test]
    async fn fixed_latency_and_guaranteed_error() {
        let engine = ChaosEngine::new();
        engine.set_enabled(true);
        engine.set_default_latency(Some(LatencyConfig { min: 10, max: 10 }));
        engine.set_default_error(Some(ErrorInjectionConfig {
            rate: 100.0,
            status: 503,
            message: "down".to_string(),
            details: None,
        }));
        let outcome = engine.apply("GET", "/x").await;
        assert_eq!(outcome.delay_ms, 10);
        assert_eq!(outcome.error.unwrap().status, 503);
        let stats = engine.stats();
        assert_eq!(stats.errors_injected, 1);
        assert_eq!(stats.total_latency_added_ms, 10);
        assert_eq!(stats.average_latency_ms, 10.0);
    }

    #[tokio::test]
    async fn zero_rate_never_injects() {
        let engine = ChaosEngine::new();
        engine.set_enabled(true);
        engine.set_default_error(Some(ErrorInjectionConfig {
            rate: 0.0,
            status: 500,
            message: "x".to_string(),
            details: None,
        }));
        for _ in 0..20 {
            let outcome = engine.apply("GET", "/x").await;
            assert!(outcome.error.is_none());
        }
        assert_eq!(engine.stats().errors_injected, 0);
    }

    #[test]
    fn validates_latency_and_error_ranges() {
        assert!(LatencyConfig { min: 10, max: 5 }.validate().is_err());
        assert!(
            ErrorInjectionConfig {
                rate: 150.0,
                status: 500,
                message: String::new(),
                details: None
            }
            .validate()
            .is_err()
        );
        assert!(
            ErrorInjectionConfig {
                rate: 10.0,
                status: 200,
                message: String::new(),
                details: None
            }
            .validate()
            .is_err()
        );
    }
}
