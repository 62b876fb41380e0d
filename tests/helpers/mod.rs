//! Test helpers and fixtures for Ripieno integration tests
//!
//! Every fixture runs on the manual backend: no hardware, and the test
//! decides when each block is pulled.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (passthrough, unity gain)
//! - `DSP_EPSILON` (1e-4): DSP processing (resampling, stretching)
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)

#![allow(dead_code)]

pub mod tolerances;

use ripieno::playback::{ModelError, ModelResult};
use ripieno::prelude::*;
use ripieno::ManualTarget;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// CD rate, used where the source and target must match.
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// Standard block size for deterministic testing
pub const TEST_BLOCK_SIZE: usize = 1024;

/// Generous upper bound for anything the fill thread has to do.
pub const FILL_TIMEOUT: Duration = Duration::from_secs(10);

/// A play source bound to a manual target.
pub struct ManualRig {
    pub source: Arc<PlaySource>,
    pub target: ManualTarget,
}

impl ManualRig {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self::with_config(PlaybackConfig::default(), sample_rate, block_size)
    }

    pub fn with_config(config: PlaybackConfig, sample_rate: u32, block_size: usize) -> Self {
        let source = Arc::new(PlaySource::new(config).expect("Failed to create play source"));
        let target = ManualTarget::new(
            &TargetConfig::manual(sample_rate, block_size),
            Arc::clone(&source) as Arc<dyn ripieno::CallbackSource>,
        );
        Self { source, target }
    }

    /// Pull one block and return a copy of the first channel.
    pub fn pull(&mut self, frames: usize) -> (usize, Vec<f32>) {
        let received = self.target.process(frames);
        (received, self.target.channel(0).to_vec())
    }

    /// Pull `blocks` blocks, waiting for each to be buffered first, and
    /// return the first channel. Every pull must be a full read.
    pub fn pull_buffered(&mut self, blocks: usize, frames: usize) -> Vec<f32> {
        let mut delivered = Vec::with_capacity(blocks * frames);
        for _ in 0..blocks {
            assert!(wait_for_buffered(&self.source, frames), "Fill thread stalled");
            let received = self.target.process(frames);
            assert_eq!(received, frames, "Short read with audio buffered");
            delivered.extend_from_slice(self.target.channel(0));
        }
        delivered
    }

    /// Pull blocks until playback leaves `Playing`, returning every frame
    /// actually delivered on the first channel.
    pub fn pull_to_end(&mut self, frames: usize) -> Vec<f32> {
        let mut delivered = Vec::new();
        let start = Instant::now();
        while self.source.state() == PlayState::Playing {
            assert!(start.elapsed() < FILL_TIMEOUT, "Playback never drained");
            let received = self.target.process(frames);
            delivered.extend_from_slice(&self.target.channel(0)[..received]);
            if received < frames {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        delivered
    }
}

/// Wait until the fill thread has buffered at least `frames` frames.
pub fn wait_for_buffered(source: &PlaySource, frames: usize) -> bool {
    wait_until(|| source.buffered_frames() >= frames)
}

/// Wait for the play source to reach `state`.
pub fn wait_for_state(source: &PlaySource, state: PlayState) -> bool {
    wait_until(|| source.state() == state)
}

pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < FILL_TIMEOUT {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

/// Generate a test signal: sine wave at given frequency for specified samples.
pub fn generate_sine(frequency: f64, sample_rate: u32, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (2.0 * std::f64::consts::PI * frequency * t).sin() as f32
        })
        .collect()
}

/// Generate an integer staircase signal [0, 1, 2, ..., n-1] as f32.
///
/// Each sample equals its index, so any output sample names the source
/// frame it came from.
pub fn generate_integer_staircase(num_samples: usize) -> Vec<f32> {
    (0..num_samples).map(|i| i as f32).collect()
}

/// Calculate RMS of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Assert that a signal is approximately silent (all values near zero).
pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}

/// Assert that a signal has content (not silent).
pub fn assert_has_audio(samples: &[f32], min_rms: f32) {
    let r = rms(samples);
    assert!(
        r >= min_rms,
        "Expected audio content with RMS >= {}, but RMS was {}",
        min_rms,
        r
    );
}

/// Count zero crossings, a rough pitch measure that survives time stretch.
pub fn zero_crossings(samples: &[f32]) -> usize {
    samples
        .windows(2)
        .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
        .count()
}

// =============================================================================
// Model fixtures
// =============================================================================

/// Model that blocks every read at or past `gate_frame` until opened.
///
/// Holding the gate stalls the fill thread inside the mixer.
pub struct GatedModel {
    inner: MemoryModel,
    gate_frame: u64,
    open: Mutex<bool>,
    cond: Condvar,
}

impl GatedModel {
    pub fn new(inner: MemoryModel, gate_frame: u64) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gate_frame,
            open: Mutex::new(false),
            cond: Condvar::new(),
        })
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }
}

impl Model for GatedModel {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn channel_count(&self) -> usize {
        self.inner.channel_count()
    }

    fn end_frame(&self) -> u64 {
        self.inner.end_frame()
    }

    fn read_frames(&self, start: u64, buffers: &mut [Vec<f32>], frames: usize) -> ModelResult<usize> {
        if start >= self.gate_frame {
            let open = self.open.lock().unwrap();
            let (open, timeout) = self
                .cond
                .wait_timeout_while(open, FILL_TIMEOUT, |open| !*open)
                .unwrap();
            if timeout.timed_out() && !*open {
                return Err(ModelError::Unavailable);
            }
        }
        self.inner.read_frames(start, buffers, frames)
    }
}

/// Auditioning effect that scales every channel it is handed by `gain`.
pub struct GainEffect {
    pub gain: f32,
    pub channels: usize,
}

impl AuditioningEffect for GainEffect {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn max_block_size(&self) -> usize {
        8192
    }

    fn process(&mut self, buffers: &mut [Vec<f32>], frames: usize) {
        for buffer in buffers.iter_mut() {
            buffer[..frames].iter_mut().for_each(|s| *s *= self.gain);
        }
    }
}
