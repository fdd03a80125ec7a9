use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Thresholds for benching a failing mirror host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorHealthConfig {
    pub failure_threshold: u32,
    pub cool_down: Duration,
}

impl Default for MirrorHealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cool_down: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Default)]
struct HostRecord {
    consecutive_failures: u32,
    benched_at: Option<Instant>,
}

/// Process-local health registry for mirror hosts.
///
/// A host that fails `failure_threshold` times in a row is skipped until the
/// cool-down elapses; it then gets a single trial request, and one more failure
/// benches it again.
#[derive(Debug, Default)]
pub struct MirrorHealth {
    config: MirrorHealthConfig,
    hosts: Mutex<HashMap<String, HostRecord>>,
}

impl MirrorHealth {
    pub fn new(config: MirrorHealthConfig) -> Self {
        Self {
            config,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn should_try(&self, host: &str) -> bool {
        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        let Some(record) = hosts.get_mut(host) else {
            return true;
        };

        match record.benched_at {
            None => true,
            Some(benched_at) if benched_at.elapsed() >= self.config.cool_down => {
                // Trial request: keep the failure count so one more miss re-benches.
                record.benched_at = None;
                record.consecutive_failures = self.config.failure_threshold.saturating_sub(1);
                true
            }
            Some(_) => false,
        }
    }

    pub fn record_success(&self, host: &str) {
        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        hosts.remove(host);
    }

    pub fn record_failure(&self, host: &str) {
        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        let record = hosts.entry(host.to_owned()).or_default();
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        if record.consecutive_failures >= self.config.failure_threshold {
            record.benched_at = Some(Instant::now());
        }
    }

    pub fn consecutive_failures(&self, host: &str) -> u32 {
        let hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        hosts
            .get(host)
            .map(|record| record.consecutive_failures)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benches_host_after_threshold_failures() {
        let health = MirrorHealth::new(MirrorHealthConfig {
            failure_threshold: 2,
            cool_down: Duration::from_secs(60),
        });

        health.record_failure("mirror.test");
        assert!(health.should_try("mirror.test"));
        health.record_failure("mirror.test");
        assert!(!health.should_try("mirror.test"));
        assert!(health.should_try("other.test"));
    }

    #[test]
    fn trial_after_cool_down_then_success_clears_record() {
        let health = MirrorHealth::new(MirrorHealthConfig {
            failure_threshold: 1,
            cool_down: Duration::from_millis(1),
        });

        health.record_failure("mirror.test");
        std::thread::sleep(Duration::from_millis(2));
        assert!(health.should_try("mirror.test"));

        health.record_success("mirror.test");
        assert_eq!(health.consecutive_failures("mirror.test"), 0);
    }

    #[test]
    fn failed_trial_benches_again_immediately() {
        let health = MirrorHealth::new(MirrorHealthConfig {
            failure_threshold: 3,
            cool_down: Duration::from_millis(200),
        });

        for _ in 0..3 {
            health.record_failure("mirror.test");
        }
        std::thread::sleep(Duration::from_millis(250));
        assert!(health.should_try("mirror.test"));

        health.record_failure("mirror.test");
        assert!(!health.should_try("mirror.test"));
    }
}
