//! Playback configuration.

use crate::resample::ResampleQuality;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Buffering and processing parameters for a [`PlaySource`](crate::PlaySource).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Minimum ring buffer capacity per channel in frames (default: 131072, ~3s @ 44.1kHz)
    pub ring_buffer_frames: usize,
    /// Ring capacity as a multiple of the target block size (default: 4)
    pub headroom_multiplier: usize,
    /// Mixer processing block in frames (default: 1024)
    pub mixer_block_size: usize,
    /// Sample rate conversion quality (default: Good)
    pub resample_quality: ResampleQuality,
    /// Auditioning effect time budget as a fraction of the block duration (default: 0.5)
    pub auditioning_budget: f64,
    /// Consecutive short reads that make one underrun episode (default: 2)
    pub underrun_episode_blocks: u32,
    /// Pending notifications kept before new ones are dropped (default: 256)
    pub event_capacity: usize,
    /// Upper bound on a single fill thread wait in ms (default: 100)
    pub max_fill_wait_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            ring_buffer_frames: 131072,
            headroom_multiplier: 4,
            mixer_block_size: 1024,
            resample_quality: ResampleQuality::Good,
            auditioning_budget: 0.5,
            underrun_episode_blocks: 2,
            event_capacity: 256,
            max_fill_wait_ms: 100,
        }
    }
}

impl PlaybackConfig {
    /// Largest number of mixer blocks produced per fill iteration.
    pub const MAX_BLOCKS_PER_FILL: usize = 16;

    /// Create config with a custom minimum ring size.
    pub fn with_ring_buffer_frames(frames: usize) -> Self {
        Self {
            ring_buffer_frames: frames,
            ..Default::default()
        }
    }

    pub fn with_resample_quality(mut self, quality: ResampleQuality) -> Self {
        self.resample_quality = quality;
        self
    }

    pub fn with_mixer_block_size(mut self, frames: usize) -> Self {
        self.mixer_block_size = frames;
        self
    }

    /// Ring capacity for a target running with `block_size` frames per period.
    pub fn ring_frames_for_block(&self, block_size: usize) -> usize {
        self.ring_buffer_frames
            .max(block_size.saturating_mul(self.headroom_multiplier))
            .max(self.mixer_block_size * 2)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mixer_block_size == 0 {
            return Err(Error::InvalidConfig(
                "mixer_block_size must be non-zero".to_string(),
            ));
        }
        if self.headroom_multiplier < 2 {
            return Err(Error::InvalidConfig(format!(
                "headroom_multiplier {} must be at least 2",
                self.headroom_multiplier
            )));
        }
        if !(self.auditioning_budget > 0.0 && self.auditioning_budget <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "auditioning_budget {} out of range (0-1]",
                self.auditioning_budget
            )));
        }
        if self.underrun_episode_blocks == 0 || self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "underrun_episode_blocks and event_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
