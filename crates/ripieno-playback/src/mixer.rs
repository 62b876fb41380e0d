//! Mixes the current model set into one block per output channel.

use crate::error::ModelError;
use crate::model::{Model, ModelId};
use crate::params::{ParameterSnapshot, PlayParameterRepository};
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A model taking part in a mix, with its identity.
#[derive(Clone)]
pub struct MixInput {
    pub id: ModelId,
    pub model: Arc<dyn Model>,
}

/// Gain applied to output channel `channel` for a model panned to `pan`.
///
/// Panning right attenuates the first channel, panning left attenuates the
/// others; the louder side stays at unity.
#[inline]
pub fn pan_gain(channel: usize, pan: f32) -> f32 {
    if channel == 0 && pan > 0.0 {
        1.0 - pan
    } else if channel >= 1 && pan < 0.0 {
        pan + 1.0
    } else {
        1.0
    }
}

/// Whether a model should be heard given its parameters, the global solo
/// filter and whether any model has solo set.
pub fn is_audible(
    id: ModelId,
    params: &ParameterSnapshot,
    solo_filter: Option<&HashSet<ModelId>>,
    any_solo: bool,
) -> bool {
    if params.muted {
        return false;
    }
    if let Some(filter) = solo_filter {
        if !filter.contains(&id) {
            return false;
        }
    }
    !any_solo || params.solo
}

/// Block mixer run on the fill thread.
pub struct Mixer {
    block_size: usize,
    channels: usize,
    scratch: Vec<Vec<f32>>,
    failures: HashMap<ModelId, u64>,
}

impl Mixer {
    pub fn new(channels: usize, block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            channels: channels.max(1),
            scratch: Vec::new(),
            failures: HashMap::new(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Mix `frames` frames starting at source frame `start` into `output`,
    /// which is overwritten on `channel_count()` channels.
    ///
    /// Frames past a model's end are silent. A model that fails or panics
    /// contributes silence for the block.
    pub fn mix(
        &mut self,
        inputs: &[MixInput],
        params: &PlayParameterRepository,
        solo_filter: Option<&HashSet<ModelId>>,
        start: u64,
        frames: usize,
        output: &mut [Vec<f32>],
    ) {
        for channel in output.iter_mut().take(self.channels) {
            if channel.len() < frames {
                channel.resize(frames, 0.0);
            }
            channel[..frames].fill(0.0);
        }

        let snapshots: Vec<ParameterSnapshot> =
            inputs.iter().map(|input| params.snapshot(input.id)).collect();
        let any_solo = snapshots.iter().any(|p| p.solo);

        for (input, snapshot) in inputs.iter().zip(&snapshots) {
            if !is_audible(input.id, snapshot, solo_filter, any_solo) {
                continue;
            }
            let read = self.read_model(input, start, frames);
            if read == 0 {
                continue;
            }

            let model_channels = input.model.channel_count().max(1);
            for (c, out) in output.iter_mut().take(self.channels).enumerate() {
                let gain = snapshot.gain * pan_gain(c, snapshot.pan);
                if gain == 0.0 {
                    continue;
                }
                let source = &self.scratch[c % model_channels][..read];
                for (o, &s) in out[..read].iter_mut().zip(source) {
                    *o += s * gain;
                }
            }
        }
    }

    fn read_model(&mut self, input: &MixInput, start: u64, frames: usize) -> usize {
        let model_channels = input.model.channel_count().max(1);
        if self.scratch.len() < model_channels {
            self.scratch.resize_with(model_channels, Vec::new);
        }
        for buffer in &mut self.scratch[..model_channels] {
            if buffer.len() < frames {
                buffer.resize(frames, 0.0);
            }
        }

        let scratch = &mut self.scratch[..model_channels];
        let result = catch_unwind(AssertUnwindSafe(|| {
            input.model.read_frames(start, scratch, frames)
        }))
        .unwrap_or(Err(ModelError::Panicked));

        match result {
            Ok(read) => {
                if let Some(streak) = self.failures.remove(&input.id) {
                    tracing::debug!(model = ?input.id, failed_blocks = streak, "Model read recovered");
                }
                read.min(frames)
            }
            Err(e) => {
                let streak = self.failures.entry(input.id).or_insert(0);
                *streak += 1;
                if *streak == 1 {
                    tracing::warn!(model = ?input.id, frame = start, error = %e, "Model read failed, substituting silence");
                } else {
                    tracing::debug!(model = ?input.id, frame = start, error = %e, "Model read still failing");
                }
                0
            }
        }
    }

    /// Forget failure streaks of models no longer mixed.
    pub fn retain_models(&mut self, inputs: &[MixInput]) {
        self.failures
            .retain(|id, _| inputs.iter().any(|input| input.id == *id));
    }
}
