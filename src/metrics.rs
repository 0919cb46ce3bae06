//! Metrics collection for guarded invocations.

use crate::decision::DenialReason;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics collector for guard and cache operations.
///
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct GuardMetrics {
    /// Number of authorization checks that reached a decision.
    pub checks: Arc<AtomicU64>,
    /// Number of checks that were allowed.
    pub allowed: Arc<AtomicU64>,
    /// Denials keyed by reason kind.
    pub denials: Arc<DashMap<&'static str, AtomicU64>>,
    /// Invocations rejected because no caller identity was available.
    pub unauthenticated: Arc<AtomicU64>,
    /// Failed directory fetches.
    pub directory_failures: Arc<AtomicU64>,
    /// Number of cache hits.
    pub cache_hits: Arc<AtomicU64>,
    /// Number of cache misses.
    pub cache_misses: Arc<AtomicU64>,
    /// Number of snapshots installed in the cache.
    pub cache_refreshes: Arc<AtomicU64>,
    /// Check durations (max per bucket).
    pub check_durations: Arc<DashMap<String, Duration>>,
}

impl Default for GuardMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            checks: Arc::new(AtomicU64::new(0)),
            allowed: Arc::new(AtomicU64::new(0)),
            denials: Arc::new(DashMap::new()),
            unauthenticated: Arc::new(AtomicU64::new(0)),
            directory_failures: Arc::new(AtomicU64::new(0)),
            cache_hits: Arc::new(AtomicU64::new(0)),
            cache_misses: Arc::new(AtomicU64::new(0)),
            cache_refreshes: Arc::new(AtomicU64::new(0)),
            check_durations: Arc::new(DashMap::new()),
        }
    }

    /// Record an allowed check.
    pub fn record_allowed(&self) {
        self.checks.fetch_add(1, Ordering::Relaxed);
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a denied check.
    pub fn record_denied(&self, reason: &DenialReason) {
        self.checks.fetch_add(1, Ordering::Relaxed);
        self.denials
            .entry(reason.kind())
            .and_modify(|count| {
                count.fetch_add(1, Ordering::Relaxed);
            })
            .or_insert_with(|| AtomicU64::new(1));
    }

    /// Record an invocation without a caller identity.
    pub fn record_unauthenticated(&self) {
        self.unauthenticated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed directory fetch.
    pub fn record_directory_failure(&self) {
        self.directory_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache hit.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss.
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a snapshot refresh.
    pub fn record_cache_refresh(&self) {
        self.cache_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the duration of a check.
    pub fn record_check_duration(&self, duration: Duration) {
        let bucket = self.duration_to_bucket(duration);
        self.check_durations
            .entry(bucket)
            .and_modify(|existing| {
                if duration > *existing {
                    *existing = duration;
                }
            })
            .or_insert(duration);
    }

    /// Number of denials recorded for a reason kind such as `"Blocked"`.
    pub fn denial_count(&self, kind: &str) -> u64 {
        self.denials
            .get(kind)
            .map(|count| count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Get cache hit ratio.
    pub fn cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get metrics summary.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            checks: self.checks.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            denials: self
                .denials
                .iter()
                .map(|entry| (entry.key().to_string(), entry.value().load(Ordering::Relaxed)))
                .collect(),
            unauthenticated: self.unauthenticated.load(Ordering::Relaxed),
            directory_failures: self.directory_failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_hit_ratio: self.cache_hit_ratio(),
            cache_refreshes: self.cache_refreshes.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.checks.store(0, Ordering::Relaxed);
        self.allowed.store(0, Ordering::Relaxed);
        self.denials.clear();
        self.unauthenticated.store(0, Ordering::Relaxed);
        self.directory_failures.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.cache_refreshes.store(0, Ordering::Relaxed);
        self.check_durations.clear();
    }

    fn duration_to_bucket(&self, duration: Duration) -> String {
        let micros = duration.as_micros();
        match micros {
            0..=99 => "0-99μs".to_string(),
            100..=999 => "100-999μs".to_string(),
            1000..=9999 => "1-9ms".to_string(),
            10000..=99999 => "10-99ms".to_string(),
            100000..=999999 => "100-999ms".to_string(),
            _ => "1s+".to_string(),
        }
    }
}

/// Summary of metrics.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub checks: u64,
    pub allowed: u64,
    pub denials: HashMap<String, u64>,
    pub unauthenticated: u64,
    pub directory_failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_ratio: f64,
    pub cache_refreshes: u64,
}

/// Records the elapsed time of a check into the duration buckets when dropped.
pub struct CheckTimer<'a> {
    start: Instant,
    metrics: &'a GuardMetrics,
}

impl<'a> CheckTimer<'a> {
    /// Start a timer.
    pub fn start(metrics: &'a GuardMetrics) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }
}

impl Drop for CheckTimer<'_> {
    fn drop(&mut self) {
        self.metrics.record_check_duration(self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::{Priority, Rank};
    use std::thread;

    #[test]
    fn test_metrics_basic_operations() {
        let metrics = GuardMetrics::new();

        metrics.record_allowed();
        metrics.record_denied(&DenialReason::UnknownRequiredRole {
            required_role: "GHOST".to_string(),
        });
        metrics.record_denied(&DenialReason::InsufficientPriority {
            caller: Rank::Unprivileged,
            required: Priority::new(10),
        });
        metrics.record_denied(&DenialReason::InsufficientPriority {
            caller: Rank::Assigned(Priority::new(5)),
            required: Priority::new(0),
        });

        assert_eq!(metrics.checks.load(Ordering::Relaxed), 4);
        assert_eq!(metrics.allowed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.denial_count("UnknownRequiredRole"), 1);
        assert_eq!(metrics.denial_count("InsufficientPriority"), 2);
        assert_eq!(metrics.denial_count("Blocked"), 0);

        metrics.record_cache_hit();
        metrics.record_cache_miss();
        assert_eq!(metrics.cache_hit_ratio(), 0.5);
    }

    #[test]
    fn test_metrics_summary_and_reset() {
        let metrics = GuardMetrics::new();

        metrics.record_allowed();
        metrics.record_unauthenticated();
        metrics.record_directory_failure();
        metrics.record_cache_refresh();

        let summary = metrics.summary();
        assert_eq!(summary.checks, 1);
        assert_eq!(summary.unauthenticated, 1);
        assert_eq!(summary.directory_failures, 1);
        assert_eq!(summary.cache_refreshes, 1);

        metrics.reset();
        let summary = metrics.summary();
        assert_eq!(summary.checks, 0);
        assert_eq!(summary.unauthenticated, 0);
        assert!(summary.denials.is_empty());
    }

    #[test]
    fn test_check_timer() {
        let metrics = GuardMetrics::new();

        {
            let _timer = CheckTimer::start(&metrics);
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(metrics.check_durations.len(), 1);
    }

    #[test]
    fn test_duration_bucketing() {
        let metrics = GuardMetrics::new();

        assert_eq!(metrics.duration_to_bucket(Duration::from_micros(50)), "0-99μs");
        assert_eq!(metrics.duration_to_bucket(Duration::from_millis(5)), "1-9ms");
        assert_eq!(metrics.duration_to_bucket(Duration::from_secs(2)), "1s+");
    }
}
