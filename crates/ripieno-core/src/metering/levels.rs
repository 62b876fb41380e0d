//! Lock-free peak levels for the two front channels.

use crate::AtomicFloat;

/// Absolute peak of a block of samples.
#[inline]
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
}

/// Last reported left/right output peaks.
///
/// Written by the real-time thread once per block, read by the UI.
#[derive(Debug, Default)]
pub struct OutputLevels {
    left: AtomicFloat,
    right: AtomicFloat,
}

impl OutputLevels {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set(&self, left: f32, right: f32) {
        self.left.set(left);
        self.right.set(right);
    }

    #[inline]
    pub fn get(&self) -> (f32, f32) {
        (self.left.get(), self.right.get())
    }

    /// Compute and store the peaks of a de-interleaved block.
    ///
    /// A single channel is reported on both sides.
    pub fn observe(&self, buffers: &[Vec<f32>], frames: usize) {
        let left = buffers.first().map_or(0.0, |b| peak(&b[..frames.min(b.len())]));
        let right = buffers
            .get(1)
            .map_or(left, |b| peak(&b[..frames.min(b.len())]));
        self.set(left, right);
    }

    pub fn reset(&self) {
        self.set(0.0, 0.0);
    }
}
