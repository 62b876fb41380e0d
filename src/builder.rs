//! Builder for configuring and constructing a `RipienoEngine`.

use crate::{Result, RipienoEngine};
use ripieno_core::{create_target, CallbackSource, TargetBackend, TargetConfig};
use ripieno_playback::{PlayParameterRepository, PlaySource, PlaybackConfig, ResampleQuality};
use std::sync::Arc;

/// The backend is chosen once, here. `Auto` opens the default CPAL device;
/// `Manual` opens no device and blocks are pulled with
/// [`RipienoEngine::process_block`].
///
/// # Example
///
/// ```ignore
/// use ripieno::prelude::*;
///
/// let engine = RipienoEngine::builder()
///     .backend(TargetBackend::Manual)
///     .sample_rate(48000)
///     .block_size(256)
///     .build()?;
/// ```
#[derive(Default)]
pub struct RipienoEngineBuilder {
    target: TargetConfig,
    playback: PlaybackConfig,
    parameters: Option<Arc<PlayParameterRepository>>,
}

impl RipienoEngineBuilder {
    /// Default: `Auto`
    pub fn backend(mut self, backend: TargetBackend) -> Self {
        self.target.backend = backend;
        self
    }

    pub fn output_device(mut self, index: usize) -> Self {
        self.target.output_device_index = Some(index);
        self
    }

    /// Rate of the manual backend. Hardware backends use the device rate.
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.target.sample_rate = rate;
        self
    }

    pub fn block_size(mut self, frames: usize) -> Self {
        self.target.block_size = Some(frames);
        self
    }

    /// Default: 1.0
    pub fn output_gain(mut self, gain: f32) -> Self {
        self.target.output_gain = gain;
        self
    }

    pub fn target_config(mut self, config: TargetConfig) -> Self {
        self.target = config;
        self
    }

    pub fn playback_config(mut self, config: PlaybackConfig) -> Self {
        self.playback = config;
        self
    }

    pub fn resample_quality(mut self, quality: ResampleQuality) -> Self {
        self.playback.resample_quality = quality;
        self
    }

    /// Share play parameters with other parts of the application.
    pub fn parameters(mut self, parameters: Arc<PlayParameterRepository>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn build(self) -> Result<RipienoEngine> {
        self.target.validate()?;
        let parameters = self.parameters.unwrap_or_default();
        let source = Arc::new(PlaySource::with_parameters(self.playback, parameters)?);

        let callback: Arc<dyn CallbackSource> = Arc::clone(&source) as Arc<dyn CallbackSource>;
        let target = create_target(&self.target, callback)?;
        tracing::info!(
            backend = target.backend_name(),
            sample_rate = target.sample_rate(),
            block_size = target.block_size(),
            "Engine ready"
        );

        Ok(RipienoEngine::new(source, target))
    }
}
