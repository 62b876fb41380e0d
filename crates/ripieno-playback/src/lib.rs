//! Real-time playback of independently timed sample sources.
//!
//! A [`PlaySource`] mixes a dynamic set of [`Model`]s on a background fill
//! thread, converts the mix to the target's rate and speed, and hands it to
//! a real-time [`Target`](ripieno_core::Target) through lock-free ring
//! buffers.
//!
//! # Primary API
//!
//! - [`PlaySource`]: model set, transport and the real-time pull
//! - [`Model`] / [`MemoryModel`]: sample sources
//! - [`PlayParameterRepository`]: per-model gain, pan, mute and solo
//! - [`PlaybackEvent`]: asynchronous notifications
//!
//! # Building blocks
//!
//! - [`RingBuffer`], [`RingBufferSet`]: SPSC handoff
//! - [`Resampler`]: block-incremental rate conversion
//! - [`TimeStretcher`]: constant-pitch speed change
//! - [`Mixer`]: model set to one block per channel

pub mod error;
pub use error::{Error, ModelError, ModelResult, Result};

pub mod config;
pub use config::PlaybackConfig;

pub mod model;
pub use model::{MemoryModel, Model, ModelId};

pub mod params;
pub use params::{ParameterSnapshot, PlayParameterRepository, PlayParameters};

pub mod ring_buffer;
pub use ring_buffer::{RingBuffer, RingBufferSet};

pub mod resample;
pub use resample::{ResampleQuality, Resampler};

pub mod time_stretch;
pub use time_stretch::{TimeStretcher, MAX_STRETCH, MIN_STRETCH};

pub mod mixer;
pub use mixer::{MixInput, Mixer};

pub mod events;
pub use events::{EventReceiver, PlaybackEvent};

pub(crate) mod fill;

pub mod source;
pub use source::{AuditioningEffect, PlayState, PlaySource};
