use std::sync::Mutex;

use chrono::Utc;
use clanker_core::config::{ResourceConfig, RetentionConfig};
use clanker_memory::store::Store;
use sysinfo::{Disks, Pid, System};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::metrics::MetricsBuffer;
use crate::types::{ResourceSample, RingBuffer, Severity};

const RING_CAPACITY: usize = 100;
const PROBE_INTERVAL_SECS: u64 = 30;

/// Periodic probe of process memory, disk usage, and CPU, with a bounded
/// history ring buffer and threshold-driven emergency retention sweeps.
pub struct ResourceMonitor<S: Store> {
    store: std::sync::Arc<S>,
    metrics: std::sync::Arc<MetricsBuffer<S>>,
    resource: ResourceConfig,
    retention: RetentionConfig,
    history: Mutex<RingBuffer>,
    sys: Mutex<System>,
    pid: Pid,
}

impl<S: Store + 'static> ResourceMonitor<S> {
    pub fn new(
        store: std::sync::Arc<S>,
        metrics: std::sync::Arc<MetricsBuffer<S>>,
        resource: ResourceConfig,
        retention: RetentionConfig,
    ) -> Self {
        let pid = Pid::from_u32(std::process::id());
        Self {
            store,
            metrics,
            resource,
            retention,
            history: Mutex::new(RingBuffer::new(RING_CAPACITY)),
            sys: Mutex::new(System::new()),
            pid,
        }
    }

    /// Take one reading across all axes. Does not touch the ring buffer.
    pub fn sample(&self) -> ResourceSample {
        let mut sys = self.sys.lock().unwrap();
        sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]), true);
        sys.refresh_cpu_usage();

        let memory_mb = sys.process(self.pid).map(|p| p.memory() / 1024 / 1024).unwrap_or(0);
        let cpu_pct = sys.process(self.pid).map(|p| p.cpu_usage()).unwrap_or(0.0);

        let disks = Disks::new_with_refreshed_list();
        let disk_pct = disks
            .iter()
            .max_by_key(|d| d.total_space())
            .map(|d| {
                let total = d.total_space() as f64;
                let avail = d.available_space() as f64;
                if total == 0.0 {
                    0.0
                } else {
                    (((total - avail) / total) * 100.0) as f32
                }
            })
            .unwrap_or(0.0);

        ResourceSample { recorded_at: Utc::now(), memory_mb, disk_pct, cpu_pct }
    }

    fn severity(&self, sample: &ResourceSample) -> Severity {
        let mem = if sample.memory_mb >= self.resource.memory_critical_mb {
            Severity::Critical
        } else if sample.memory_mb >= self.resource.memory_warning_mb {
            Severity::Warning
        } else {
            Severity::Ok
        };
        let disk = if sample.disk_pct >= self.resource.disk_critical_pct {
            Severity::Critical
        } else if sample.disk_pct >= self.resource.disk_warning_pct {
            Severity::Warning
        } else {
            Severity::Ok
        };
        let cpu = if sample.cpu_pct >= self.resource.cpu_critical_pct {
            Severity::Critical
        } else if sample.cpu_pct >= self.resource.cpu_warning_pct {
            Severity::Warning
        } else {
            Severity::Ok
        };
        mem.max(disk).max(cpu)
    }

    async fn probe_tick(&self) {
        let sample = self.sample();
        let severity = self.severity(&sample);
        self.history.lock().unwrap().push(sample);

        self.metrics.record("system", "process_memory_mb", sample.memory_mb as f64).await;
        self.metrics.record("system", "disk_usage_pct", sample.disk_pct as f64).await;
        self.metrics.record("system", "cpu_usage_pct", sample.cpu_pct as f64).await;

        match severity {
            Severity::Critical => {
                warn!(
                    memory_mb = sample.memory_mb,
                    disk_pct = sample.disk_pct,
                    cpu_pct = sample.cpu_pct,
                    "critical resource threshold breached, running emergency retention sweep"
                );
                self.emergency_sweep().await;
            }
            Severity::Warning => {
                warn!(
                    memory_mb = sample.memory_mb,
                    disk_pct = sample.disk_pct,
                    cpu_pct = sample.cpu_pct,
                    "resource warning threshold breached"
                );
            }
            Severity::Ok => {}
        }
    }

    async fn emergency_sweep(&self) {
        let message_days = (self.retention.message_retention_days / 4).max(1);
        let metric_days = (self.retention.metric_retention_days / 2).max(1);
        match self.store.cleanup_old_messages(message_days).await {
            Ok(n) => info!(deleted = n, retention_days = message_days, "emergency message cleanup"),
            Err(e) => error!(error = %e, "emergency message cleanup failed"),
        }
        match self.store.cleanup_old_metrics(metric_days).await {
            Ok(n) => info!(deleted = n, retention_days = metric_days, "emergency metric cleanup"),
            Err(e) => error!(error = %e, "emergency metric cleanup failed"),
        }
    }

    async fn cleanup_tick(&self) {
        match self.store.cleanup_old_messages(self.retention.message_retention_days).await {
            Ok(n) => info!(deleted = n, "routine message cleanup"),
            Err(e) => error!(error = %e, "routine message cleanup failed"),
        }
        match self.store.cleanup_old_metrics(self.retention.metric_retention_days).await {
            Ok(n) => info!(deleted = n, "routine metric cleanup"),
            Err(e) => error!(error = %e, "routine metric cleanup failed"),
        }
    }

    /// Most recent sample, if any have been taken yet.
    pub fn latest(&self) -> Option<ResourceSample> {
        self.history.lock().unwrap().latest().copied()
    }

    /// Main loop: probes every 30s, runs routine retention cleanup every
    /// `cleanup_interval_minutes`, until `shutdown` broadcasts `true`.
    pub async fn run(self: std::sync::Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("resource monitor started");
        let mut probe = tokio::time::interval(std::time::Duration::from_secs(PROBE_INTERVAL_SECS));
        let cleanup_secs = (self.retention.cleanup_interval_minutes as u64).max(1) * 60;
        let mut cleanup = tokio::time::interval(std::time::Duration::from_secs(cleanup_secs));

        loop {
            tokio::select! {
                _ = probe.tick() => {
                    self.probe_tick().await;
                }
                _ = cleanup.tick() => {
                    self.cleanup_tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("resource monitor shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clanker_memory::store::SqliteStore;

    fn test_monitor() -> ResourceMonitor<SqliteStore> {
        let store = std::sync::Arc::new(SqliteStore::open_in_memory().unwrap());
        let metrics = std::sync::Arc::new(MetricsBuffer::new(store.clone()));
        ResourceMonitor::new(store, metrics, ResourceConfig::default(), RetentionConfig::default())
    }

    #[test]
    fn severity_ok_below_all_thresholds() {
        let monitor = test_monitor();
        let sample = ResourceSample { recorded_at: Utc::now(), memory_mb: 10, disk_pct: 1.0, cpu_pct: 1.0 };
        assert_eq!(monitor.severity(&sample), Severity::Ok);
    }

    #[test]
    fn severity_critical_when_any_axis_critical() {
        let monitor = test_monitor();
        let sample = ResourceSample { recorded_at: Utc::now(), memory_mb: 99_999, disk_pct: 1.0, cpu_pct: 1.0 };
        assert_eq!(monitor.severity(&sample), Severity::Critical);
    }

    #[tokio::test]
    async fn emergency_sweep_uses_reduced_retention() {
        let store = std::sync::Arc::new(SqliteStore::open_in_memory().unwrap());
        store.store_message("chan", "alice", "hi", "id-1", false, false).await.unwrap();
        let retention = RetentionConfig { message_retention_days: 4, metric_retention_days: 2, cleanup_interval_minutes: 60 };
        let metrics = std::sync::Arc::new(MetricsBuffer::new(store.clone()));
        let monitor = ResourceMonitor::new(store.clone(), metrics, ResourceConfig::default(), retention);

        // message stored "now" is never older than 1 day, so cleanup at any
        // positive retention leaves it in place; this exercises the code path
        // without asserting on deletion timing.
        monitor.emergency_sweep().await;
        let messages = store.get_recent_messages("chan", 10).await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn ring_buffer_caps_at_capacity() {
        let mut buf = RingBuffer::new(3);
        for i in 0..5u64 {
            buf.push(ResourceSample { recorded_at: Utc::now(), memory_mb: i, disk_pct: 0.0, cpu_pct: 0.0 });
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.latest().unwrap().memory_mb, 4);
    }
}
