//! Deterministic backend with no device: the caller pulls each block.
//!
//! Used for CI and tests, where hardware audio I/O is unavailable.

use crate::metering::peak;
use crate::target::{CallbackSource, FrameClock, Target, TargetBinding, TargetClock};
use crate::{AtomicFloat, TargetConfig};
use std::sync::Arc;

pub struct ManualTarget {
    source: Arc<dyn CallbackSource>,
    clock: Arc<FrameClock>,
    gain: AtomicFloat,
    sample_rate: u32,
    block_size: usize,
    buffers: Vec<Vec<f32>>,
    last_frames: usize,
    last_received: usize,
    attached: bool,
}

impl ManualTarget {
    pub fn new(config: &TargetConfig, source: Arc<dyn CallbackSource>) -> Self {
        let sample_rate = config.sample_rate;
        let block_size = config.block_size_or_default();
        let clock = Arc::new(FrameClock::new(sample_rate));

        source.set_target(Some(TargetBinding::new(&clock)), block_size);
        source.set_target_sample_rate(sample_rate);
        source.set_target_play_latency(0);

        Self {
            source,
            clock,
            gain: AtomicFloat::new(config.output_gain),
            sample_rate,
            block_size,
            buffers: Vec::new(),
            last_frames: 0,
            last_received: 0,
            attached: true,
        }
    }

    /// Pull `frames` frames from the source, as a hardware callback would.
    pub fn process(&mut self, frames: usize) -> usize {
        if !self.attached {
            return 0;
        }

        let channels = self.source.target_channel_count().max(1);
        if self.buffers.len() != channels {
            self.buffers.resize_with(channels, Vec::new);
        }
        for buffer in &mut self.buffers {
            if buffer.len() < frames {
                buffer.resize(frames, 0.0);
            }
        }

        let received = self.source.get_source_samples(frames, &mut self.buffers);

        let gain = self.gain.get();
        if gain != 1.0 {
            for buffer in &mut self.buffers {
                buffer[..frames].iter_mut().for_each(|s| *s *= gain);
            }
        }
        let left = peak(&self.buffers[0][..frames]);
        let right = self.buffers.get(1).map_or(left, |b| peak(&b[..frames]));
        self.source.set_output_levels(left, right);

        self.clock.advance(frames);
        self.last_frames = frames;
        self.last_received = received;
        received
    }

    /// Output of the most recent pull for one channel.
    pub fn channel(&self, channel: usize) -> &[f32] {
        self.buffers
            .get(channel)
            .map_or(&[][..], |b| &b[..self.last_frames])
    }

    pub fn channel_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn last_received(&self) -> usize {
        self.last_received
    }
}

impl Target for ManualTarget {
    fn backend_name(&self) -> &'static str {
        "manual"
    }

    fn is_ok(&self) -> bool {
        self.attached
    }

    fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn set_output_gain(&self, gain: f32) {
        self.gain.set(gain.max(0.0));
    }

    fn output_gain(&self) -> f32 {
        self.gain.get()
    }

    fn process_block(&mut self) -> Option<usize> {
        Some(self.process(self.block_size))
    }

    fn shutdown(&mut self) {
        if self.attached {
            self.attached = false;
            self.source.set_target(None, 0);
        }
    }
}

impl Drop for ManualTarget {
    fn drop(&mut self) {
        self.shutdown();
    }
}
