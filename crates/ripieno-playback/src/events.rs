//! Notifications published by a play source.
//!
//! Events are sent from control and fill threads only, never from the
//! real-time callback. The channel is bounded; when the consumer falls
//! behind, new events are dropped rather than blocking the sender.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::time::Duration;

/// Receiving end handed out by [`PlaySource::events`](crate::PlaySource::events).
pub type EventReceiver = Receiver<PlaybackEvent>;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Playback started (`true`) or stopped (`false`).
    PlayStatusChanged(bool),
    /// Source and target rates differ.
    ///
    /// `will_resample` is false when a model could not be reconciled with
    /// the rate already in use by other models.
    SampleRateMismatch {
        requested: u32,
        available: u32,
        will_resample: bool,
    },
    /// The source rate or channel layout changed and buffers were rebuilt.
    ModelReplaced,
    /// The auditioning effect was bypassed after an overload report.
    AudioOverloadPluginDisabled,
    /// Multi-channel time stretching fell back to the mono path.
    AudioTimeStretchMultiChannelDisabled,
    /// A run of short reads started; `total` counts episodes so far.
    Underrun { total: u64 },
    /// The auditioning effect exceeded its time budget and was bypassed.
    AuditioningEffectBypassed { elapsed: Duration },
}

/// Sending half, shared by the control and fill threads.
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    tx: Sender<PlaybackEvent>,
}

impl EventSender {
    pub(crate) fn send(&self, event: PlaybackEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::debug!(?event, "Event queue full, dropping");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

pub(crate) fn event_channel(capacity: usize) -> (EventSender, Receiver<PlaybackEvent>) {
    let (tx, rx) = bounded(capacity.max(1));
    (EventSender { tx }, rx)
}
