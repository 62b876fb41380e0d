//! The play source: model set, state machine and the real-time pull.
//!
//! # Threads
//!
//! - Control threads call the public methods. They take the control lock
//!   briefly and never wait on the real-time thread.
//! - One fill thread per playback run mixes models into ring buffers.
//! - The target's real-time thread calls
//!   [`get_source_samples`](CallbackSource::get_source_samples), which only
//!   touches atomics and the ring buffers.

pub(crate) mod auditioning;
pub(crate) mod ranges;
pub(crate) mod shared;
mod state;
mod timing;

pub use auditioning::AuditioningEffect;
pub use state::PlayState;

use crate::config::PlaybackConfig;
use crate::events::{event_channel, PlaybackEvent};
use crate::fill::FillThread;
use crate::model::{Model, ModelId};
use crate::params::PlayParameterRepository;
use crate::resample::ResampleQuality;
use crate::time_stretch::clamp_factor;
use crate::{Error, Result};
use auditioning::AuditioningSlot;
use crossbeam_channel::Receiver;
use ripieno_core::{CallbackSource, TargetBinding};
use shared::{ModelEntry, Shared};
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use timing::playing_frame;

/// Delivers mixed model audio to a real-time target.
///
/// Share it as `Arc<PlaySource>`; the same handle is given to a target as
/// its [`CallbackSource`].
pub struct PlaySource {
    shared: Arc<Shared>,
    events: Receiver<PlaybackEvent>,
}

impl PlaySource {
    pub fn new(config: PlaybackConfig) -> Result<Self> {
        Self::with_parameters(config, Arc::new(PlayParameterRepository::new()))
    }

    /// Create a source reading gain/pan/mute/solo from an existing repository.
    pub fn with_parameters(
        config: PlaybackConfig,
        params: Arc<PlayParameterRepository>,
    ) -> Result<Self> {
        config.validate()?;
        let (tx, events) = event_channel(config.event_capacity);
        Ok(Self {
            shared: Arc::new(Shared::new(config, params, tx)),
            events,
        })
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.shared.config
    }

    pub fn play_parameters(&self) -> &Arc<PlayParameterRepository> {
        &self.shared.params
    }

    /// Receiver for [`PlaybackEvent`]s. All clones share one queue.
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.events.clone()
    }

    pub fn state(&self) -> PlayState {
        self.shared.state.get()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayState::Playing
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Start playing at `start`, or seek if already playing.
    ///
    /// The start is moved into the play ranges: a start at or past the end
    /// of material plays from the beginning. Returns the frame playback
    /// starts from.
    pub fn play(&self, start: u64) -> Result<u64> {
        let shared = &self.shared;
        let was_playing;
        let start = {
            let mut control = shared.control.lock();
            if control.target.is_none() {
                return Err(Error::NotReady);
            }
            if control.source_rate == 0 {
                return Err(Error::NoSource);
            }

            let start = shared.seek_locked(&mut control, start);

            // A thread that ran out of material is already on its way out.
            if control.fill.as_ref().is_some_and(FillThread::is_exiting) {
                if let Some(mut finished) = control.fill.take() {
                    finished.stop();
                }
            }

            was_playing = shared.state.get() == PlayState::Playing;
            shared.state.set(PlayState::Playing);
            if control.fill.is_none() {
                match FillThread::spawn(Arc::clone(shared)) {
                    Ok(fill) => control.fill = Some(fill),
                    Err(e) => {
                        control.seek = None;
                        shared.state.set(PlayState::Ready);
                        tracing::error!(error = %e, "Failed to start fill thread");
                        return Err(e);
                    }
                }
            }
            start
        };

        shared.wake_fill();
        if was_playing {
            tracing::debug!(frame = start, "Seek");
        } else {
            tracing::debug!(frame = start, "Play");
            shared.events.send(PlaybackEvent::PlayStatusChanged(true));
        }
        Ok(start)
    }

    /// Stop playback and join the fill thread. Idempotent.
    pub fn stop(&self) {
        let shared = &self.shared;
        let was_playing = shared.state.transition(PlayState::Playing, PlayState::Stopping);

        let fill = {
            let mut control = shared.control.lock();
            control.seek = None;
            control.fill.take()
        };
        // Joined without the control lock; the fill loop takes it.
        if let Some(mut fill) = fill {
            fill.stop();
        }

        shared.clear_buffers();
        shared.retired.scavenge();

        if was_playing {
            let next = if shared.control.lock().target.is_some() {
                PlayState::Ready
            } else {
                PlayState::Idle
            };
            shared.state.transition(PlayState::Stopping, next);
            tracing::debug!(frame = shared.timing.last_reported(), "Stop");
            shared.events.send(PlaybackEvent::PlayStatusChanged(false));
        }
    }

    /// Whether to wrap back to frame 0 at the end of material.
    pub fn set_looping(&self, looping: bool) {
        self.shared.looping.set(looping);
        self.shared.wake_fill();
    }

    pub fn is_looping(&self) -> bool {
        self.shared.looping.get()
    }

    /// Play only `ranges` of the material, in order, skipping the gaps.
    ///
    /// Ranges are merged and clipped to the material. An empty list, or one
    /// with nothing inside the material, plays everything. While playing,
    /// playback continues from the current position moved into the new
    /// ranges.
    pub fn set_play_ranges(&self, ranges: Vec<Range<u64>>) {
        let shared = &self.shared;
        let resume = self.is_playing().then(|| self.current_playing_frame());
        let resumed = {
            let mut control = shared.control.lock();
            control.selection = ranges;
            control.rebuild_ranges();
            shared.publish(&control);
            tracing::debug!(ranges = ?control.ranges.ranges(), "Play ranges changed");
            resume.map(|frame| shared.seek_locked(&mut control, frame))
        };
        if let Some(frame) = resumed {
            tracing::debug!(frame, "Seek into new play ranges");
        }
        shared.wake_fill();
    }

    pub fn clear_play_ranges(&self) {
        self.set_play_ranges(Vec::new());
    }

    /// The ranges playback walks through, after merging and clipping.
    pub fn play_ranges(&self) -> Vec<Range<u64>> {
        self.shared.control.lock().ranges.ranges().to_vec()
    }

    // =========================================================================
    // Models
    // =========================================================================

    /// Add a model to the mix. Takes effect at the next block boundary.
    ///
    /// The first model sets the source rate. A model at another rate takes
    /// over the source rate only if no remaining model uses it; otherwise a
    /// [`PlaybackEvent::SampleRateMismatch`] is reported and the model plays
    /// at the wrong speed.
    pub fn add_model(&self, model: &Arc<dyn Model>) -> Result<()> {
        let rate = model.sample_rate();
        let channels = model.channel_count();
        if rate == 0 || channels == 0 {
            return Err(Error::InvalidModel(format!(
                "sample rate {} and channel count {} must be non-zero",
                rate, channels
            )));
        }

        let shared = &self.shared;
        let id = ModelId::of(model);
        let mut events = Vec::new();
        {
            let mut control = shared.control.lock();
            if control.models.iter().any(|entry| entry.id == id) {
                return Ok(());
            }

            let old_rate = control.source_rate;
            let old_channels = control.source_channels;
            if old_rate == 0 {
                control.source_rate = rate;
            } else if rate != old_rate {
                let rate_in_use = control
                    .models
                    .iter()
                    .any(|entry| entry.sample_rate == old_rate && entry.model.strong_count() > 0);
                if rate_in_use {
                    tracing::warn!(rate, source_rate = old_rate, "Model rate differs from other models");
                    events.push(PlaybackEvent::SampleRateMismatch {
                        requested: rate,
                        available: old_rate,
                        will_resample: false,
                    });
                } else {
                    control.source_rate = rate;
                }
            }
            control.source_channels = old_channels.max(channels);

            control.models.push(ModelEntry {
                id,
                model: Arc::downgrade(model),
                sample_rate: rate,
                end_frame: model.end_frame(),
            });
            control.recompute_end_frame();
            control.revision += 1;

            if old_rate != 0
                && (control.source_rate != old_rate || control.source_channels != old_channels)
            {
                events.push(PlaybackEvent::ModelReplaced);
            }
            events.extend(control.note_target_mismatch(shared.target_rate()));
            shared.publish(&control);
        }

        shared.params.get_or_create(id);
        tracing::debug!(model = ?id, rate, channels, "Added model");
        shared.send(events);
        shared.wake_fill();
        Ok(())
    }

    /// Remove a model. Returns whether it was part of the mix.
    ///
    /// The channel count does not shrink; the source rate is cleared once
    /// no models remain.
    pub fn remove_model(&self, model: &Arc<dyn Model>) -> bool {
        let id = ModelId::of(model);
        {
            let mut control = self.shared.control.lock();
            let Some(index) = control.models.iter().position(|entry| entry.id == id) else {
                return false;
            };
            control.models.remove(index);
            control.recompute_end_frame();
            control.revision += 1;
            if control.models.is_empty() {
                control.source_rate = 0;
            }
            self.shared.publish(&control);
        }
        tracing::debug!(model = ?id, "Removed model");
        self.shared.wake_fill();
        true
    }

    pub fn clear_models(&self) {
        {
            let mut control = self.shared.control.lock();
            control.models.clear();
            control.source_rate = 0;
            control.source_channels = 0;
            control.recompute_end_frame();
            control.revision += 1;
            control.reported_mismatches.clear();
            self.shared.publish(&control);
        }
        tracing::debug!("Cleared models");
        self.shared.wake_fill();
    }

    pub fn model_count(&self) -> usize {
        self.shared.control.lock().models.len()
    }

    /// Play only `models`, regardless of their own solo flags.
    pub fn set_solo_model_set(&self, models: HashSet<ModelId>) {
        self.replace_solo_filter(Some(Arc::new(models)));
    }

    pub fn clear_solo_model_set(&self) {
        self.replace_solo_filter(None);
    }

    fn replace_solo_filter(&self, filter: Option<Arc<HashSet<ModelId>>>) {
        {
            let mut control = self.shared.control.lock();
            control.solo_filter = filter;
            control.revision += 1;
        }
        self.shared.wake_fill();
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Change playback speed without changing pitch. 1.0 is unchanged,
    /// 2.0 plays at half speed. Clamped to 0.25..=4.0.
    ///
    /// Re-enables multi-channel stretching if an overload had disabled it.
    pub fn set_time_stretch(&self, factor: f64) {
        self.shared.stretch.set(clamp_factor(factor));
        self.shared.stretch_mono.set(false);
        self.shared.wake_fill();
    }

    pub fn time_stretch(&self) -> f64 {
        self.shared.stretch.get()
    }

    pub fn set_resample_quality(&self, quality: ResampleQuality) {
        self.shared.control.lock().quality = quality;
        self.shared.wake_fill();
    }

    pub fn resample_quality(&self) -> ResampleQuality {
        self.shared.control.lock().quality
    }

    /// Install (or with `None`, remove) the auditioning effect.
    pub fn set_auditioning_effect(&self, effect: Option<Box<dyn AuditioningEffect>>) {
        let slot = effect.map(|effect| Arc::new(AuditioningSlot::new(effect)));
        self.shared.replace_effect(slot);
    }

    pub fn has_auditioning_effect(&self) -> bool {
        self.shared.effect.load().is_some()
    }

    /// Whether the installed effect has been bypassed after an overload or
    /// a budget overrun.
    pub fn is_auditioning_bypassed(&self) -> bool {
        self.shared
            .effect
            .load_full()
            .is_some_and(|slot| slot.is_bypassed())
    }

    // =========================================================================
    // Position and status
    // =========================================================================

    /// Source frame currently audible at the output.
    pub fn current_playing_frame(&self) -> u64 {
        let shared = &self.shared;
        if shared.state.get() != PlayState::Playing {
            return shared.timing.last_reported();
        }
        let Some(set) = shared.active.load_full() else {
            return shared.timing.last_reported();
        };

        let looping = shared.looping.get();
        let ranges = shared.ranges.load_full();
        let latency = shared.timing.output_latency(
            shared.target_latency.load(Ordering::Acquire),
            shared.target_rate(),
        );
        let offset = playing_frame(
            set.frame_at_read_head(),
            set.step(),
            latency,
            shared.timing.play_start(),
            ranges.total(),
            looping,
        );
        let frame = ranges.frame_at(offset);
        if looping {
            frame
        } else {
            shared.timing.report_monotonic(frame)
        }
    }

    /// Source frame at the read head: the next one handed to the target.
    pub fn current_buffered_frame(&self) -> u64 {
        let shared = &self.shared;
        let ranges = shared.ranges.load_full();
        let Some(set) = shared.active.load_full() else {
            return ranges.frame_at(shared.timing.play_start());
        };
        ranges.frame_at(playing_frame(
            set.frame_at_read_head(),
            set.step(),
            0.0,
            set.start_frame(),
            ranges.total(),
            shared.looping.get(),
        ))
    }

    /// Frames ready for the real-time thread.
    pub fn buffered_frames(&self) -> usize {
        self.shared
            .active
            .load_full()
            .map_or(0, |set| set.read_space())
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.shared.control.lock().source_rate
    }

    pub fn source_channel_count(&self) -> usize {
        self.shared.control.lock().source_channels
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.shared.target_rate()
    }

    /// Frame after the last frame of the longest model.
    pub fn play_end_frame(&self) -> u64 {
        self.shared.end_frame.load(Ordering::Acquire)
    }

    /// Ring buffer capacity per channel for the current target.
    pub fn ring_buffer_frames(&self) -> usize {
        self.shared.control.lock().ring_frames
    }

    /// Peaks of the last block handed to the target.
    pub fn source_levels(&self) -> (f32, f32) {
        self.shared.source_levels.get()
    }

    /// Post-gain peaks reported back by the target.
    pub fn output_levels(&self) -> (f32, f32) {
        self.shared.output_levels.get()
    }

    /// Underrun episodes since creation.
    pub fn underrun_count(&self) -> u64 {
        self.shared.underruns.load(Ordering::Acquire)
    }

    /// Real-time: count a short read, flagging one underrun per episode.
    #[inline]
    fn note_short_read(&self) {
        let shared = &self.shared;
        let short = shared.short_reads.fetch_add(1, Ordering::AcqRel) + 1;
        if short == shared.config.underrun_episode_blocks {
            shared.underruns.fetch_add(1, Ordering::AcqRel);
            shared.underrun_pending.raise();
        }
    }
}

impl CallbackSource for PlaySource {
    fn set_target(&self, binding: Option<TargetBinding>, block_size: usize) {
        let shared = &self.shared;
        let attach = binding.is_some();
        {
            let mut control = shared.control.lock();
            control.target = binding;
            control.block_size = block_size;
            if attach {
                control.ring_frames = shared.config.ring_frames_for_block(block_size);
                shared.target_block.store(block_size, Ordering::Release);
                shared.state.transition(PlayState::Idle, PlayState::Ready);
            }
        }

        if attach {
            tracing::debug!(block_size, "Target attached");
            shared.wake_fill();
        } else {
            self.stop();
            shared.state.set(PlayState::Idle);
            tracing::debug!("Target detached");
        }
    }

    fn set_target_sample_rate(&self, rate: u32) {
        let shared = &self.shared;
        shared.target_rate.store(rate, Ordering::Release);
        let event = shared.control.lock().note_target_mismatch(rate);
        if let Some(event) = event {
            tracing::info!(?event, "Resampling to target rate");
            shared.events.send(event);
        }
        shared.wake_fill();
    }

    fn set_target_play_latency(&self, frames: u64) {
        self.shared.target_latency.store(frames, Ordering::Release);
    }

    fn target_channel_count(&self) -> usize {
        self.shared.target_channels()
    }

    fn get_source_samples(&self, count: usize, buffers: &mut [Vec<f32>]) -> usize {
        let shared = &*self.shared;
        let count = buffers
            .iter()
            .map(Vec::len)
            .min()
            .map_or(0, |len| count.min(len));

        if shared.state.get() != PlayState::Playing {
            for buffer in buffers.iter_mut() {
                buffer[..count].fill(0.0);
            }
            return 0;
        }

        let read = {
            let active = shared.active.load();
            match &*active {
                Some(set) => {
                    let read = set.read(buffers, count);
                    if read == count {
                        shared.short_reads.store(0, Ordering::Relaxed);
                    } else if !set.is_finished() && set.write_fill() != set.start_frame() {
                        self.note_short_read();
                    }
                    read
                }
                None => {
                    for buffer in buffers.iter_mut() {
                        buffer[..count].fill(0.0);
                    }
                    0
                }
            }
        };
        shared.timing.record_retrieval(count);

        if let Some(slot) = &*shared.effect.load() {
            let rate = shared.target_rate().max(1) as f64;
            let budget =
                Duration::from_secs_f64(count as f64 / rate * shared.config.auditioning_budget);
            slot.apply(buffers, count, budget);
        }

        shared.source_levels.observe(buffers, count);
        read
    }

    fn set_output_levels(&self, left: f32, right: f32) {
        self.shared.output_levels.set(left, right);
    }

    fn audio_processing_overload(&self) {
        self.shared.overload_requested.raise();
    }
}

impl Drop for PlaySource {
    fn drop(&mut self) {
        self.stop();
        self.shared.replace_effect(None);
        self.shared.retired.scavenge();
    }
}

impl fmt::Debug for PlaySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaySource")
            .field("state", &self.state())
            .field("models", &self.model_count())
            .field("source_rate", &self.source_sample_rate())
            .field("target_rate", &self.target_sample_rate())
            .finish()
    }
}
