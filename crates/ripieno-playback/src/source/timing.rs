//! Playback position estimation.
//!
//! The real-time thread records the size and time of each pull. Control
//! threads combine that with the read head of the active buffers and the
//! target's output latency to estimate which source frame is audible now.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub(crate) struct Timing {
    epoch: Instant,
    last_block: AtomicUsize,
    last_retrieval_nanos: AtomicU64,
    play_start: AtomicU64,
    last_reported: AtomicU64,
}

impl Timing {
    pub(crate) fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_block: AtomicUsize::new(0),
            last_retrieval_nanos: AtomicU64::new(0),
            play_start: AtomicU64::new(0),
            last_reported: AtomicU64::new(0),
        }
    }

    /// Real-time thread only.
    #[inline]
    pub(crate) fn record_retrieval(&self, frames: usize) {
        let nanos = self.epoch.elapsed().as_nanos() as u64;
        self.last_block.store(frames, Ordering::Relaxed);
        self.last_retrieval_nanos.store(nanos, Ordering::Release);
    }

    pub(crate) fn last_block(&self) -> usize {
        self.last_block.load(Ordering::Relaxed)
    }

    pub(crate) fn since_retrieval(&self) -> Duration {
        let last = self.last_retrieval_nanos.load(Ordering::Acquire);
        let now = self.epoch.elapsed().as_nanos() as u64;
        Duration::from_nanos(now.saturating_sub(last))
    }

    /// Play-range offset the current run started at.
    pub(crate) fn play_start(&self) -> u64 {
        self.play_start.load(Ordering::Acquire)
    }

    /// Forget the previous run, which now starts at source frame `frame`
    /// (play-range offset `offset`).
    pub(crate) fn reset(&self, offset: u64, frame: u64) {
        self.play_start.store(offset, Ordering::Release);
        self.last_reported.store(frame, Ordering::Release);
        self.last_block.store(0, Ordering::Relaxed);
    }

    /// Output frames between the read head and what is audible now.
    pub(crate) fn output_latency(&self, target_latency: u64, target_rate: u32) -> f64 {
        let last_block = self.last_block() as f64;
        let elapsed = self.since_retrieval().as_secs_f64() * target_rate as f64;
        target_latency as f64 + last_block - elapsed.min(last_block)
    }

    /// Record `frame` unless it would move backwards, returning the
    /// position to report.
    pub(crate) fn report_monotonic(&self, frame: u64) -> u64 {
        let previous = self.last_reported.fetch_max(frame, Ordering::AcqRel);
        previous.max(frame)
    }

    pub(crate) fn last_reported(&self) -> u64 {
        self.last_reported.load(Ordering::Acquire)
    }
}

/// Play-range offset audible at the output.
///
/// `head` is the unwrapped offset at the read head, `step` the source
/// frames per output frame and `latency` the output frames still in flight.
/// Never precedes `start`; wraps at `end` when looping.
pub(crate) fn playing_frame(
    head: f64,
    step: f64,
    latency: f64,
    start: u64,
    end: u64,
    looping: bool,
) -> u64 {
    let frame = (head - latency * step).max(start as f64).max(0.0) as u64;
    match (looping, end) {
        (_, 0) => frame,
        (true, end) => frame % end,
        (false, end) => frame.min(end),
    }
}
