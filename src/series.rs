//! Bounded, continuously-evicting time series for visualization.
//!
//! Two windowed series (CPU, RAM) share one time axis; disk usage is a
//! two-value snapshot replaced wholesale on every update. Nothing here
//! grows without bound: once the window fills, every append evicts the
//! oldest entry.

use chrono::{DateTime, Local, Timelike};
use std::collections::VecDeque;

use crate::protocol::MetricSample;

/// Default window width, in samples. At one sample per second this is two
/// minutes of visible history.
pub const DEFAULT_WINDOW: usize = 120;

/// Fixed-capacity, append-and-evict series of `(label, value)` pairs.
///
/// Eviction is driven by a monotone update counter rather than a length
/// comparison: the oldest pair is dropped only once the counter has
/// exceeded the capacity, so the buffer holds `capacity + 1` entries for
/// the instant between push and evict inside the triggering append.
#[derive(Debug, Clone)]
pub struct SeriesBuffer {
    capacity: usize,
    update_count: u64,
    labels: VecDeque<String>,
    values: VecDeque<f64>,
}

impl SeriesBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            update_count: 0,
            labels: VecDeque::with_capacity(capacity + 1),
            values: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Append a sample. Malformed values (NaN) are stored as-is; whether
    /// and how to draw them is the rendering layer's concern.
    pub fn append(&mut self, label: impl Into<String>, value: f64) {
        self.labels.push_back(label.into());
        self.values.push_back(value);
        self.update_count += 1;
        if self.update_count > self.capacity as u64 {
            self.labels.pop_front();
            self.values.pop_front();
        }
    }

    /// Current window contents, oldest first.
    pub fn current_series(&self) -> (Vec<String>, Vec<f64>) {
        (
            self.labels.iter().cloned().collect(),
            self.values.iter().copied().collect(),
        )
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.labels.len(), self.values.len());
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Non-windowed disk usage snapshot, replaced wholesale on every update.
///
/// NaN until the first sample arrives.
#[derive(Debug, Clone, Copy)]
pub struct DiskSnapshot {
    pub used: f64,
    pub free: f64,
}

impl Default for DiskSnapshot {
    fn default() -> Self {
        Self {
            used: f64::NAN,
            free: f64::NAN,
        }
    }
}

/// Everything the dashboard draws: CPU and RAM windows sharing one time
/// axis, plus the disk snapshot.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    cpu: SeriesBuffer,
    ram: SeriesBuffer,
    disk: DiskSnapshot,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            cpu: SeriesBuffer::new(capacity),
            ram: SeriesBuffer::new(capacity),
            disk: DiskSnapshot::default(),
        }
    }

    /// Record one validated sample under a shared timestamp label.
    pub fn record(&mut self, label: &str, sample: &MetricSample) {
        self.cpu.append(label, sample.cpu_usage);
        self.ram.append(label, sample.ram_percentage);
        self.disk = DiskSnapshot {
            used: sample.disk_used,
            free: sample.disk_free,
        };
    }

    pub fn cpu(&self) -> &SeriesBuffer {
        &self.cpu
    }

    pub fn ram(&self) -> &SeriesBuffer {
        &self.ram
    }

    pub fn disk(&self) -> DiskSnapshot {
        self.disk
    }
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// `HH:MM` axis label for a sample arrival time.
pub fn timestamp_label(at: DateTime<Local>) -> String {
    format!("{:02}:{:02}", at.hour(), at.minute())
}
