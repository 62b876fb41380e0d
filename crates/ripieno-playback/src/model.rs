//! Sample sources played by a [`PlaySource`](crate::PlaySource).

use crate::error::ModelResult;
use std::sync::Arc;

/// A fixed-rate, fixed-channel-count audio source addressable by frame offset.
///
/// Models are owned by the caller. A play source only keeps a weak reference,
/// and reads happen exclusively on the fill thread.
pub trait Model: Send + Sync {
    fn sample_rate(&self) -> u32;

    fn channel_count(&self) -> usize;

    /// Frame after the last frame of material.
    fn end_frame(&self) -> u64;

    /// Read up to `frames` frames starting at `start` into the first
    /// `channel_count()` buffers, de-interleaved.
    ///
    /// Returns the number of frames written, which is less than `frames`
    /// only at the end of material.
    fn read_frames(&self, start: u64, buffers: &mut [Vec<f32>], frames: usize)
        -> ModelResult<usize>;
}

/// Identity of a model, stable for as long as the model is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(usize);

impl ModelId {
    pub fn of(model: &Arc<dyn Model>) -> Self {
        Self(Arc::as_ptr(model) as *const () as usize)
    }
}

/// In-memory model over de-interleaved sample vectors.
#[derive(Debug, Clone)]
pub struct MemoryModel {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl MemoryModel {
    /// Channels shorter than the longest are treated as zero-padded.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            sample_rate,
            channels,
            frames,
        }
    }

    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self::new(sample_rate, vec![samples])
    }

    pub fn from_interleaved(sample_rate: u32, channel_count: usize, samples: &[f32]) -> Self {
        let channel_count = channel_count.max(1);
        let mut channels = vec![Vec::with_capacity(samples.len() / channel_count); channel_count];
        for frame in samples.chunks(channel_count) {
            for (ch, &sample) in frame.iter().enumerate() {
                channels[ch].push(sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn into_shared(self) -> Arc<dyn Model> {
        Arc::new(self)
    }
}

impl Model for MemoryModel {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn end_frame(&self) -> u64 {
        self.frames as u64
    }

    fn read_frames(
        &self,
        start: u64,
        buffers: &mut [Vec<f32>],
        frames: usize,
    ) -> ModelResult<usize> {
        if start >= self.frames as u64 {
            return Ok(0);
        }
        let start = start as usize;
        let count = frames.min(self.frames - start);

        for (source, dest) in self.channels.iter().zip(buffers.iter_mut()) {
            let available = source.len().saturating_sub(start).min(count);
            dest[..available].copy_from_slice(&source[start..start + available]);
            dest[available..count].fill(0.0);
        }
        Ok(count)
    }
}
