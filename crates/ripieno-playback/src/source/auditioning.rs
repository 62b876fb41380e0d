//! The single auditioning effect slot.
//!
//! The effect runs on the real-time thread at the end of every pull. It is
//! given a time budget; a block that takes longer bypasses the effect for
//! the rest of its life and leaves a note for the fill thread to report.

use parking_lot::Mutex;
use ripieno_core::AtomicFlag;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Caller-supplied real-time transform applied to the mixed output.
pub trait AuditioningEffect: Send {
    /// Channels the effect processes. Extra output channels pass through.
    fn channel_count(&self) -> usize;

    /// Largest block the effect accepts. Larger pulls pass through untouched.
    fn max_block_size(&self) -> usize;

    /// Process `frames` frames of `buffers` in place.
    fn process(&mut self, buffers: &mut [Vec<f32>], frames: usize);
}

pub(crate) struct AuditioningSlot {
    effect: Mutex<Box<dyn AuditioningEffect>>,
    bypassed: AtomicFlag,
    exceeded_nanos: AtomicU64,
}

impl AuditioningSlot {
    pub(crate) fn new(effect: Box<dyn AuditioningEffect>) -> Self {
        Self {
            effect: Mutex::new(effect),
            bypassed: AtomicFlag::new(false),
            exceeded_nanos: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_bypassed(&self) -> bool {
        self.bypassed.get()
    }

    pub(crate) fn bypass(&self) {
        self.bypassed.raise();
    }

    /// Run the effect unless bypassed or busy. Real-time thread only.
    pub(crate) fn apply(&self, buffers: &mut [Vec<f32>], frames: usize, budget: Duration) {
        if self.bypassed.get() || frames == 0 {
            return;
        }
        let Some(mut effect) = self.effect.try_lock() else {
            return;
        };
        if frames > effect.max_block_size() {
            return;
        }

        let channels = effect.channel_count().min(buffers.len());
        let started = Instant::now();
        effect.process(&mut buffers[..channels], frames);
        let elapsed = started.elapsed();

        if elapsed > budget {
            self.bypassed.raise();
            let nanos = (elapsed.as_nanos() as u64).max(1);
            self.exceeded_nanos.store(nanos, Ordering::Release);
        }
    }

    /// Time taken by the block that tripped the budget, once.
    pub(crate) fn take_exceeded(&self) -> Option<Duration> {
        match self.exceeded_nanos.swap(0, Ordering::AcqRel) {
            0 => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }
}
