//! Background thread keeping the ring buffers ahead of the real-time pull.

mod retire;
mod worker;

pub(crate) use retire::{RetireQueue, Retired};

use crate::source::shared::Shared;
use crate::Result;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Wakes the fill thread early. Signalled by control threads only.
#[derive(Debug, Default)]
pub(crate) struct FillWake {
    woken: Mutex<bool>,
    cond: Condvar,
}

impl FillWake {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn notify(&self) {
        *self.woken.lock() = true;
        self.cond.notify_one();
    }

    /// Sleep until notified or `timeout` passes.
    pub(crate) fn wait(&self, timeout: Duration) {
        let mut woken = self.woken.lock();
        if !*woken {
            self.cond.wait_for(&mut woken, timeout);
        }
        *woken = false;
    }
}

/// Handle to a running fill thread. Joined on [`stop`](Self::stop) or drop.
pub(crate) struct FillThread {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<FillWake>,
}

impl FillThread {
    pub(crate) fn spawn(shared: Arc<Shared>) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let wake = Arc::clone(&shared.wake);

        let thread_shutdown = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("ripieno-fill".into())
            .spawn(move || worker::fill_loop(shared, thread_shutdown))?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            wake,
        })
    }

    /// The thread has been told to exit or has decided to.
    pub(crate) fn is_exiting(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
            || self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub(crate) fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Fill thread panicked");
            }
        }
    }
}

impl Drop for FillThread {
    fn drop(&mut self) {
        self.stop();
    }
}
