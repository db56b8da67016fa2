use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const MAX_FAILURES: u32 = 3;
const RECOVERY_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceHealth {
    Healthy = 0,
    Degraded = 1,
    Unavailable = 2,
    Recovering = 3,
}

impl ServiceHealth {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Healthy,
            1 => Self::Degraded,
            2 => Self::Unavailable,
            _ => Self::Recovering,
        }
    }
}

impl std::fmt::Display for ServiceHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Recovering => write!(f, "recovering"),
        }
    }
}

/// Tracks consecutive failures against the Ollama backend and derives a
/// four-state health signal. `Healthy`/`Degraded` still attempt generation;
/// `Unavailable` and `Recovering` (before the recovery timeout elapses) go
/// straight to the silent-failure fallback.
pub struct HealthTracker {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    unavailable_since: Mutex<Option<Instant>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(ServiceHealth::Healthy as u8),
            consecutive_failures: AtomicU32::new(0),
            unavailable_since: Mutex::new(None),
        }
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.state.store(ServiceHealth::Healthy as u8, Ordering::SeqCst);
        *self.unavailable_since.lock().unwrap() = None;
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= MAX_FAILURES {
            self.state.store(ServiceHealth::Unavailable as u8, Ordering::SeqCst);
            let mut since = self.unavailable_since.lock().unwrap();
            if since.is_none() {
                *since = Some(Instant::now());
            }
        } else {
            self.state.store(ServiceHealth::Degraded as u8, Ordering::SeqCst);
        }
    }

    /// Current state, applying the recovery-timeout transition: after
    /// `RECOVERY_TIMEOUT` in `Unavailable`, flip to `Recovering` so the next
    /// call is allowed to probe the backend again.
    pub fn state(&self) -> ServiceHealth {
        let current = ServiceHealth::from_u8(self.state.load(Ordering::SeqCst));
        if current == ServiceHealth::Unavailable {
            let since = *self.unavailable_since.lock().unwrap();
            if let Some(since) = since {
                if since.elapsed() >= RECOVERY_TIMEOUT {
                    self.state.store(ServiceHealth::Recovering as u8, Ordering::SeqCst);
                    return ServiceHealth::Recovering;
                }
            }
        }
        current
    }

    /// True when generation should be attempted at all; false means go
    /// straight to the silent-failure fallback without hitting the network.
    pub fn should_attempt(&self) -> bool {
        !matches!(self.state(), ServiceHealth::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy() {
        let h = HealthTracker::new();
        assert_eq!(h.state(), ServiceHealth::Healthy);
        assert!(h.should_attempt());
    }

    #[test]
    fn degrades_before_becoming_unavailable() {
        let h = HealthTracker::new();
        h.record_failure();
        assert_eq!(h.state(), ServiceHealth::Degraded);
        assert!(h.should_attempt());

        h.record_failure();
        assert_eq!(h.state(), ServiceHealth::Degraded);

        h.record_failure();
        assert_eq!(h.state(), ServiceHealth::Unavailable);
        assert!(!h.should_attempt());
    }

    #[test]
    fn success_resets_to_healthy() {
        let h = HealthTracker::new();
        h.record_failure();
        h.record_failure();
        h.record_failure();
        assert_eq!(h.state(), ServiceHealth::Unavailable);

        h.record_success();
        assert_eq!(h.state(), ServiceHealth::Healthy);
        assert!(h.should_attempt());
    }
}
