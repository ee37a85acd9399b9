use chrono::{DateTime, Utc};
use serde::Serialize;

/// Rolling in-memory statistics for one provider.
///
/// Reset on every `reload_providers`; never persisted. The registry's
/// `failure_count` column tracks trips across restarts, this tracks the
/// current process's view for ranking and health decisions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderStats {
    pub total_attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl ProviderStats {
    pub fn record_success(&mut self) {
        self.total_attempts += 1;
        self.successes += 1;
        self.consecutive_failures = 0;
        self.last_used_at = Some(Utc::now());
    }

    pub fn record_failure(&mut self) {
        self.total_attempts += 1;
        self.failures += 1;
        self.consecutive_failures += 1;
        let now = Utc::now();
        self.last_used_at = Some(now);
        self.last_failure_at = Some(now);
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        self.failures as f64 / self.total_attempts as f64
    }

    /// Untried providers score as fully successful.
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 1.0;
        }
        self.successes as f64 / self.total_attempts as f64
    }

    /// Whether the failure rate justifies tripping the provider unhealthy.
    pub fn should_trip(&self, threshold: f64, min_attempts: u64) -> bool {
        self.total_attempts >= min_attempts && self.failure_rate() > threshold
    }
}
