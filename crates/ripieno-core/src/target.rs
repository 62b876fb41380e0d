//! The contract between a play source and the backend that drives it.
//!
//! A backend adapter ([`Target`]) owns the hardware stream. When it opens it
//! binds itself to a [`CallbackSource`] with
//! [`set_target`](CallbackSource::set_target), reports its sample rate and
//! latency, and from then on calls
//! [`get_source_samples`](CallbackSource::get_source_samples) once per
//! hardware period from its real-time thread.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Time base exposed by a running target.
pub trait TargetClock: Send + Sync {
    /// Seconds of audio consumed by the device since the stream started.
    fn current_time(&self) -> f64;
}

/// Non-owning handle from a source back to its target's clock.
#[derive(Clone)]
pub struct TargetBinding {
    clock: Weak<dyn TargetClock>,
}

impl TargetBinding {
    pub fn new<C: TargetClock + 'static>(clock: &Arc<C>) -> Self {
        let clock: Weak<C> = Arc::downgrade(clock);
        Self { clock }
    }

    /// Current device time, or `None` once the target has gone away.
    pub fn current_time(&self) -> Option<f64> {
        self.clock.upgrade().map(|clock| clock.current_time())
    }
}

impl fmt::Debug for TargetBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetBinding")
            .field("alive", &(self.clock.strong_count() > 0))
            .finish()
    }
}

/// Clock that counts frames handed to the device.
#[derive(Debug)]
pub struct FrameClock {
    frames: AtomicU64,
    sample_rate: AtomicU32,
}

impl FrameClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate: AtomicU32::new(sample_rate),
        }
    }

    #[inline]
    pub fn advance(&self, frames: usize) {
        self.frames.fetch_add(frames as u64, Ordering::Release);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }
}

impl TargetClock for FrameClock {
    fn current_time(&self) -> f64 {
        let rate = self.sample_rate.load(Ordering::Relaxed);
        if rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / rate as f64
    }
}

/// The side of a play source that a target talks to.
///
/// `get_source_samples`, `set_output_levels`, `set_target_play_latency` and
/// `audio_processing_overload` may be called from the real-time thread and
/// must not block or allocate.
pub trait CallbackSource: Send + Sync {
    /// Bind (or with `None`, unbind) the target and report its block size.
    fn set_target(&self, binding: Option<TargetBinding>, block_size: usize);

    /// Report the rate the target actually runs at.
    fn set_target_sample_rate(&self, rate: u32);

    /// Report the output latency in frames at the target rate.
    fn set_target_play_latency(&self, frames: u64);

    /// Number of channels `get_source_samples` will fill.
    fn target_channel_count(&self) -> usize;

    /// Fill `count` frames of each buffer, returning how many frames carried
    /// real data. The remainder is always zeroed.
    fn get_source_samples(&self, count: usize, buffers: &mut [Vec<f32>]) -> usize;

    /// Report post-gain output peaks.
    fn set_output_levels(&self, left: f32, right: f32);

    /// Signal that the callback is running out of time.
    fn audio_processing_overload(&self);
}

/// A backend adapter driving a [`CallbackSource`].
pub trait Target: Send {
    fn backend_name(&self) -> &'static str;

    /// Whether the stream is open and has not reported an error.
    fn is_ok(&self) -> bool;

    fn current_time(&self) -> f64;

    fn sample_rate(&self) -> u32;

    fn block_size(&self) -> usize;

    fn set_output_gain(&self, gain: f32);

    fn output_gain(&self) -> f32;

    /// Pull one block on the calling thread.
    ///
    /// Only backends without their own clock support this; others return `None`.
    fn process_block(&mut self) -> Option<usize> {
        None
    }

    /// Close the stream and unbind from the source. Idempotent.
    fn shutdown(&mut self);
}
