use chrono::{DateTime, Utc};

/// Which axis a sample or threshold applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAxis {
    Memory,
    Disk,
    Cpu,
}

impl std::fmt::Display for ResourceAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceAxis::Memory => "memory",
            ResourceAxis::Disk => "disk",
            ResourceAxis::Cpu => "cpu",
        };
        write!(f, "{s}")
    }
}

/// Severity of a threshold breach, ordered so `max` picks the worse one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

/// One probe reading across all axes.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSample {
    pub recorded_at: DateTime<Utc>,
    pub memory_mb: u64,
    pub disk_pct: f32,
    pub cpu_pct: f32,
}

/// Fixed-capacity ring buffer of the last `CAPACITY` samples.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    capacity: usize,
    samples: std::collections::VecDeque<ResourceSample>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, samples: std::collections::VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, sample: ResourceSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&ResourceSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceSample> {
        self.samples.iter()
    }
}
