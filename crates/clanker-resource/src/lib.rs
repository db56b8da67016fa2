//! `clanker-resource` — periodic resource monitoring and retention.
//!
//! [`engine::ResourceMonitor`] samples process memory, disk usage, and CPU
//! every 30 seconds into a bounded ring buffer, escalating to an emergency
//! retention sweep when a critical threshold is breached. A routine cleanup
//! also runs on a configurable interval honouring the normal retention
//! settings. [`metrics::MetricsBuffer`] is the companion best-effort counter
//! buffer flushed into the metrics table on its own timer.

pub mod engine;
pub mod error;
pub mod metrics;
pub mod types;

pub use engine::ResourceMonitor;
pub use error::{Result, ResourceError};
pub use metrics::MetricsBuffer;
pub use types::{ResourceAxis, ResourceSample, RingBuffer, Severity};
