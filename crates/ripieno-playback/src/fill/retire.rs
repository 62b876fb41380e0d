//! Deferred release of buffers the real-time thread may still be reading.
//!
//! Replaced ring buffer sets and effect slots are pushed here instead of
//! being dropped. The fill thread frees an item once it holds the last
//! reference, so the real-time thread never runs a destructor.

use crate::ring_buffer::RingBufferSet;
use crate::source::auditioning::AuditioningSlot;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

pub(crate) enum Retired {
    Buffers(Arc<RingBufferSet>),
    Effect(Arc<AuditioningSlot>),
}

impl Retired {
    fn is_unreferenced(&self) -> bool {
        match self {
            Retired::Buffers(set) => Arc::strong_count(set) == 1,
            Retired::Effect(slot) => Arc::strong_count(slot) == 1,
        }
    }
}

/// Pushed from control and fill threads, scavenged off the real-time path.
pub(crate) struct RetireQueue {
    tx: Sender<Retired>,
    rx: Receiver<Retired>,
    held: Mutex<Vec<Retired>>,
}

impl RetireQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            held: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn retire(&self, item: Retired) {
        // Both halves live in this struct, so the channel cannot be closed.
        let _ = self.tx.send(item);
    }

    pub(crate) fn retire_buffers(&self, set: Option<Arc<RingBufferSet>>) {
        if let Some(set) = set {
            self.retire(Retired::Buffers(set));
        }
    }

    /// Free everything no longer referenced, keeping the rest for later.
    /// Returns the number of items freed.
    pub(crate) fn scavenge(&self) -> usize {
        let mut held = self.held.lock();
        held.extend(self.rx.try_iter());
        let before = held.len();
        held.retain(|item| !item.is_unreferenced());
        before - held.len()
    }

    /// Items waiting to be freed.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.held.lock().len() + self.rx.len()
    }
}
