//! Callback load tracking for audio backends.

use crate::AtomicFloat;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// CPU metrics snapshot.
#[derive(Debug, Clone, Default)]
pub struct CpuMetrics {
    pub average: f32,
    pub peak: f32,
    pub current: f32,
    pub late_callbacks: u64,
}

/// Measures how much of each hardware period the callback consumes.
///
/// A load of 1.0 means the callback took the whole period.
pub struct CpuMeter {
    current: AtomicFloat,
    peak: AtomicFloat,
    average: AtomicFloat,
    late_callbacks: AtomicU64,
    samples: AtomicU32,
    sample_rate: f64,
}

impl CpuMeter {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            current: AtomicFloat::new(0.0),
            peak: AtomicFloat::new(0.0),
            average: AtomicFloat::new(0.0),
            late_callbacks: AtomicU64::new(0),
            samples: AtomicU32::new(0),
            sample_rate: sample_rate.max(1.0),
        }
    }

    /// Record one callback and return its load.
    pub fn record(&self, frames: usize, elapsed: Duration) -> f32 {
        if frames == 0 {
            return 0.0;
        }

        let period = frames as f64 / self.sample_rate;
        let load = (elapsed.as_secs_f64() / period) as f32;

        self.current.set(load);
        self.peak.raise_to(load);

        let count = self.samples.fetch_add(1, Ordering::Relaxed);
        let alpha = 1.0 / (count.min(100) + 1) as f32;
        let avg = self.average.get();
        self.average.set(avg * (1.0 - alpha) + load * alpha);

        if load > 1.0 {
            self.late_callbacks.fetch_add(1, Ordering::Relaxed);
        }

        load
    }

    pub fn metrics(&self) -> CpuMetrics {
        CpuMetrics {
            average: self.average.get() * 100.0,
            peak: self.peak.get() * 100.0,
            current: self.current.get() * 100.0,
            late_callbacks: self.late_callbacks.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.current.set(0.0);
        self.peak.set(0.0);
        self.average.set(0.0);
        self.late_callbacks.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
    }
}
