//! Play source lifecycle.

use std::sync::atomic::{AtomicU8, Ordering};

/// `Idle` (no target) -> `Ready` (target attached) -> `Playing` ->
/// `Stopping` -> `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlayState {
    Idle = 0,
    Ready = 1,
    Playing = 2,
    Stopping = 3,
}

impl PlayState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PlayState::Ready,
            2 => PlayState::Playing,
            3 => PlayState::Stopping,
            _ => PlayState::Idle,
        }
    }
}

#[derive(Debug)]
pub(crate) struct AtomicPlayState(AtomicU8);

impl AtomicPlayState {
    pub(crate) fn new(state: PlayState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub(crate) fn get(&self) -> PlayState {
        PlayState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: PlayState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`, returning whether this call did it.
    pub(crate) fn transition(&self, from: PlayState, to: PlayState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
