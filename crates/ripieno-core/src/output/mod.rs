//! Backend adapters and the factory that selects one at startup.

#[cfg(feature = "cpal")]
mod cpal_target;
mod manual;

#[cfg(feature = "cpal")]
pub use cpal_target::{list_output_devices, CpalTarget};
pub use manual::ManualTarget;

use crate::{CallbackSource, Error, Result, Target, TargetBackend, TargetConfig};
use std::sync::Arc;

/// Callback load above which the source is told to shed work.
pub const OVERLOAD_THRESHOLD: f32 = 0.7;

/// Open the backend named in `config` and bind it to `source`.
///
/// On failure the source is left without a target.
pub fn create_target(
    config: &TargetConfig,
    source: Arc<dyn CallbackSource>,
) -> Result<Box<dyn Target>> {
    config.validate()?;

    match config.backend {
        TargetBackend::Manual => Ok(Box::new(ManualTarget::new(config, source))),
        TargetBackend::Cpal => open_cpal(config, source),
        TargetBackend::Auto => match open_cpal(config, source) {
            Ok(target) => Ok(target),
            Err(e) => {
                tracing::warn!(error = %e, "No hardware audio backend could be opened");
                Err(e)
            }
        },
    }
}

#[cfg(feature = "cpal")]
fn open_cpal(config: &TargetConfig, source: Arc<dyn CallbackSource>) -> Result<Box<dyn Target>> {
    let target = CpalTarget::open(config, source)?;
    tracing::info!(
        device = %target.device_name(),
        sample_rate = target.sample_rate(),
        "Opened CPAL output"
    );
    Ok(Box::new(target))
}

#[cfg(not(feature = "cpal"))]
fn open_cpal(_config: &TargetConfig, _source: Arc<dyn CallbackSource>) -> Result<Box<dyn Target>> {
    Err(Error::BackendUnavailable(
        "cpal support not compiled in".to_string(),
    ))
}
