//! # Ripieno - Real-time Playback Engine
//!
//! Plays a dynamic set of independently timed sample sources through a
//! real-time audio callback.
//!
//! ## Architecture
//!
//! Ripieno is an umbrella crate that coordinates:
//! - **ripieno-core** - Target contract, backends (CPAL, manual), metering, lock-free atomics
//! - **ripieno-playback** - Play source, fill thread, ring buffers, resampling, time stretch
//!
//! ## Quick Start
//!
//! ```ignore
//! use ripieno::prelude::*;
//!
//! let engine = RipienoEngine::builder().build()?;
//!
//! let model = MemoryModel::mono(44100, samples).into_shared();
//! engine.add_model(&model)?;
//! engine.source().set_time_stretch(1.5);
//! engine.play(0)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cpal` (default) - Hardware output through CPAL

/// Re-export of ripieno-core for direct access
pub use ripieno_core as core;

/// Re-export of ripieno-playback for direct access
pub use ripieno_playback as playback;

// Backends
pub use ripieno_core::{
    create_target, CallbackSource, ManualTarget, Target, TargetBackend, TargetConfig,
};

#[cfg(feature = "cpal")]
pub use ripieno_core::{list_output_devices, CpalTarget};

// Playback
pub use ripieno_playback::{
    AuditioningEffect, MemoryModel, Model, ModelId, PlayParameterRepository, PlayParameters,
    PlaySource, PlayState, PlaybackConfig, PlaybackEvent, ResampleQuality,
};

mod error;
pub use error::{Error, Result};

mod builder;
mod engine;

pub use builder::RipienoEngineBuilder;
pub use engine::RipienoEngine;

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{RipienoEngine, RipienoEngineBuilder};

    // Backend selection
    pub use crate::core::{TargetBackend, TargetConfig};

    // Models and parameters
    pub use crate::playback::{MemoryModel, Model, ModelId, PlayParameterRepository};

    // Transport and processing
    pub use crate::playback::{
        AuditioningEffect, PlayState, PlaySource, PlaybackConfig, PlaybackEvent, ResampleQuality,
    };
}
