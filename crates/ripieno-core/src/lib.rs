//! Real-time primitives shared by the Ripieno playback engine.
//!
//! # Primary API
//!
//! - [`CallbackSource`] / [`Target`]: the contract between a play source and
//!   the backend that drives it
//! - [`create_target`]: open a backend chosen by [`TargetConfig`]
//! - [`ManualTarget`]: deterministic backend pulled by the caller
//! - [`OutputLevels`], [`CpuMeter`]: metering
//!
//! # Feature flags
//!
//! - `"cpal"` (default): [`CpalTarget`] hardware output

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{TargetBackend, TargetConfig};

pub(crate) mod lockfree;
pub use lockfree::{AtomicDouble, AtomicFlag, AtomicFloat};

pub(crate) mod metering;
pub use metering::{peak, CpuMeter, CpuMetrics, OutputLevels};

pub mod target;
pub use target::{CallbackSource, FrameClock, Target, TargetBinding, TargetClock};

pub mod output;
pub use output::{create_target, ManualTarget, OVERLOAD_THRESHOLD};

#[cfg(feature = "cpal")]
pub use output::{list_output_devices, CpalTarget};
