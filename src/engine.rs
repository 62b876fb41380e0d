//! RipienoEngine that owns a play source and the target driving it.

use crate::builder::RipienoEngineBuilder;
use crate::Result;
use ripieno_core::Target;
use ripieno_playback::{EventReceiver, Model, PlaySource};
use std::sync::Arc;

/// A [`PlaySource`] bound to an output backend.
///
/// Dropping the engine stops playback and closes the backend.
///
/// # Example
///
/// ```ignore
/// use ripieno::prelude::*;
///
/// let engine = RipienoEngine::builder().build()?;
/// let model = MemoryModel::mono(44100, samples).into_shared();
/// engine.add_model(&model)?;
/// engine.play(0)?;
/// ```
pub struct RipienoEngine {
    source: Arc<PlaySource>,
    target: Box<dyn Target>,
}

impl RipienoEngine {
    pub fn builder() -> RipienoEngineBuilder {
        RipienoEngineBuilder::default()
    }

    pub(crate) fn new(source: Arc<PlaySource>, target: Box<dyn Target>) -> Self {
        Self { source, target }
    }

    pub fn source(&self) -> &Arc<PlaySource> {
        &self.source
    }

    pub fn target(&self) -> &dyn Target {
        self.target.as_ref()
    }

    pub fn backend_name(&self) -> &'static str {
        self.target.backend_name()
    }

    /// Rate the backend runs at.
    pub fn sample_rate(&self) -> u32 {
        self.target.sample_rate()
    }

    pub fn block_size(&self) -> usize {
        self.target.block_size()
    }

    /// Whether the backend is open and healthy.
    pub fn is_ok(&self) -> bool {
        self.target.is_ok()
    }

    pub fn set_output_gain(&self, gain: f32) {
        self.target.set_output_gain(gain);
    }

    pub fn add_model(&self, model: &Arc<dyn Model>) -> Result<()> {
        Ok(self.source.add_model(model)?)
    }

    pub fn remove_model(&self, model: &Arc<dyn Model>) -> bool {
        self.source.remove_model(model)
    }

    pub fn play(&self, frame: u64) -> Result<u64> {
        Ok(self.source.play(frame)?)
    }

    pub fn stop(&self) {
        self.source.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.source.is_playing()
    }

    pub fn current_frame(&self) -> u64 {
        self.source.current_playing_frame()
    }

    pub fn events(&self) -> EventReceiver {
        self.source.events()
    }

    /// Pull one block on this thread. Only the manual backend supports
    /// this; hardware backends return `None`.
    pub fn process_block(&mut self) -> Option<usize> {
        self.target.process_block()
    }
}

impl Drop for RipienoEngine {
    fn drop(&mut self) {
        self.source.stop();
        self.target.shutdown();
    }
}

impl std::fmt::Debug for RipienoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RipienoEngine")
            .field("backend", &self.backend_name())
            .field("sample_rate", &self.sample_rate())
            .field("source", &self.source)
            .finish()
    }
}
