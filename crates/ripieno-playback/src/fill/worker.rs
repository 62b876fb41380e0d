//! The fill loop: mix, convert, buffer.
//!
//! Each playback run writes into one [`RingBufferSet`]. When anything that
//! shapes the buffered audio changes mid-run (models, parameters, rates,
//! stretch) a second set is filled from the current read head and swapped
//! in once it has caught up, so already-buffered audio never goes stale for
//! longer than one fill iteration.

use crate::config::PlaybackConfig;
use crate::events::PlaybackEvent;
use crate::mixer::{MixInput, Mixer};
use crate::model::ModelId;
use crate::resample::{ResampleQuality, Resampler};
use crate::ring_buffer::RingBufferSet;
use crate::source::ranges::PlayRanges;
use crate::source::shared::Shared;
use crate::source::PlayState;
use crate::time_stretch::TimeStretcher;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Stretch factors below this resample with the fastest tier.
const FAST_RESAMPLE_BELOW_STRETCH: f64 = 0.4;

/// Everything that determines the content of a buffered run.
#[derive(Debug, Clone, PartialEq)]
struct FillPlan {
    model_revision: u64,
    param_revision: u64,
    source_rate: u32,
    target_rate: u32,
    channels: usize,
    stretch: f64,
    mono: bool,
    looping: bool,
    quality: ResampleQuality,
    ring_frames: usize,
}

impl FillPlan {
    /// Output frames per source frame from rate conversion.
    fn ratio(&self) -> f64 {
        self.target_rate as f64 / self.source_rate as f64
    }

    /// Source frames per buffered frame.
    fn step(&self) -> f64 {
        1.0 / (self.ratio() * self.stretch)
    }

    fn resample_quality(&self) -> ResampleQuality {
        if self.stretch < FAST_RESAMPLE_BELOW_STRETCH {
            ResampleQuality::Fastest
        } else {
            self.quality
        }
    }
}

struct Snapshot {
    plan: FillPlan,
    inputs: Vec<MixInput>,
    ranges: Arc<PlayRanges>,
    solo_filter: Option<Arc<HashSet<ModelId>>>,
    seek: Option<u64>,
}

/// Converts mixed blocks for one buffer set.
///
/// `position` is an offset on the play-range timeline, wrapped into it
/// when looping.
struct Pipeline {
    set: Arc<RingBufferSet>,
    plan: FillPlan,
    mixer: Mixer,
    resampler: Option<Resampler>,
    stretcher: Option<TimeStretcher>,
    position: u64,
    written: u64,
    mix_buf: Vec<Vec<f32>>,
    stage_buf: Vec<Vec<f32>>,
    carry: Vec<Vec<f32>>,
    ended: bool,
}

impl Pipeline {
    fn new(set: Arc<RingBufferSet>, plan: FillPlan, position: u64, config: &PlaybackConfig) -> Self {
        let channels = plan.channels;
        let ratio = plan.ratio();

        let resampler = if (ratio - 1.0).abs() > f64::EPSILON {
            match Resampler::new(ratio, plan.resample_quality(), channels) {
                Ok(resampler) => Some(resampler),
                Err(e) => {
                    tracing::error!(error = %e, ratio, "Resampler unavailable, playing at source rate");
                    None
                }
            }
        } else {
            None
        };

        let stretcher = (plan.stretch != 1.0).then(|| {
            let mut stretcher = TimeStretcher::new(channels, plan.target_rate, plan.stretch);
            stretcher.set_mono(plan.mono);
            stretcher
        });

        tracing::debug!(
            generation = set.generation(),
            start = set.start_frame(),
            ratio,
            stretch = plan.stretch,
            channels,
            "Armed fill pipeline"
        );

        Self {
            set,
            mixer: Mixer::new(channels, config.mixer_block_size),
            resampler,
            stretcher,
            position,
            written: 0,
            mix_buf: vec![vec![0.0; config.mixer_block_size]; channels],
            stage_buf: vec![Vec::new(); channels],
            carry: vec![Vec::new(); channels],
            ended: false,
            plan,
        }
    }

    fn carry_len(&self) -> usize {
        self.carry[0].len()
    }

    /// Move converted audio into the ring, as much as fits.
    fn drain_carry(&mut self) -> usize {
        let written = self.set.write(&self.carry, self.carry_len());
        if written > 0 {
            for channel in &mut self.carry {
                channel.drain(..written);
            }
            self.written += written as u64;
            let fill = self.set.start_frame() as f64 + self.written as f64 * self.plan.step();
            self.set.set_write_fill(fill.round() as u64);
        }
        written
    }

    /// Mix and convert up to a budget of source frames. Returns whether
    /// anything reached the ring.
    fn produce(&mut self, snapshot: &Snapshot, shared: &Shared) -> bool {
        let mut wrote = self.drain_carry();
        if self.ended {
            if self.carry_len() == 0 && !self.set.is_finished() {
                self.set.mark_finished();
                tracing::debug!(generation = self.set.generation(), "Buffered to end of material");
            }
            return wrote > 0;
        }

        let block = self.mixer.block_size();
        let space = self.set.write_space().saturating_sub(self.carry_len());
        let affordable = (space as f64 * self.plan.step()) as usize / block * block;
        let mut budget = affordable.min(PlaybackConfig::MAX_BLOCKS_PER_FILL * block);
        if budget == 0 {
            // Conversion can emit more than it is fed in one go; the carry
            // absorbs that, so at least keep half-empty buffers moving.
            if self.carry_len() == 0 && space * 2 >= self.set.capacity() {
                budget = block;
            } else {
                return wrote > 0;
            }
        }

        self.mixer.retain_models(&snapshot.inputs);
        let total = snapshot.ranges.total();
        while budget > 0 {
            if total == 0 || (!self.plan.looping && self.position >= total) {
                self.finish();
                break;
            }
            if self.position >= total {
                self.position = 0;
            }
            let Some((frame, left_in_range)) = snapshot.ranges.locate(self.position) else {
                break;
            };
            // Never mix across a range boundary; the next block jumps.
            let frames = budget.min(block).min(left_in_range as usize);
            self.mix_block(snapshot, shared, frame, frames);
            budget -= frames;
            // Publish per block so the reader never waits on a whole batch.
            wrote += self.drain_carry();
        }

        wrote += self.drain_carry();
        if self.ended && self.carry_len() == 0 {
            self.set.mark_finished();
        }
        wrote > 0
    }

    fn mix_block(&mut self, snapshot: &Snapshot, shared: &Shared, frame: u64, frames: usize) {
        self.mixer.mix(
            &snapshot.inputs,
            &shared.params,
            snapshot.solo_filter.as_deref(),
            frame,
            frames,
            &mut self.mix_buf,
        );
        self.position += frames as u64;

        let resampled = match self.resampler.as_mut() {
            Some(resampler) => {
                let dest = if self.stretcher.is_some() {
                    for stage in &mut self.stage_buf {
                        stage.clear();
                    }
                    &mut self.stage_buf
                } else {
                    &mut self.carry
                };
                match resampler.process(&self.mix_buf, frames, dest, false) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!(error = %e, "Resampling failed, playing at source rate");
                        self.resampler = None;
                        false
                    }
                }
            }
            None => false,
        };

        match (self.stretcher.as_mut(), resampled) {
            (Some(stretcher), true) => {
                let staged = self.stage_buf[0].len();
                stretcher.process(&self.stage_buf, staged, &mut self.carry);
            }
            (Some(stretcher), false) => {
                stretcher.process(&self.mix_buf, frames, &mut self.carry);
            }
            (None, true) => {}
            (None, false) => {
                for (carry, mixed) in self.carry.iter_mut().zip(&self.mix_buf) {
                    carry.extend_from_slice(&mixed[..frames]);
                }
            }
        }
    }

    /// Flush converter tails at the end of material.
    fn finish(&mut self) {
        if let Some(resampler) = self.resampler.as_mut() {
            let dest = if self.stretcher.is_some() {
                for stage in &mut self.stage_buf {
                    stage.clear();
                }
                &mut self.stage_buf
            } else {
                &mut self.carry
            };
            if let Err(e) = resampler.process(&[], 0, dest, true) {
                tracing::warn!(error = %e, "Resampler flush failed");
            }
            if let Some(stretcher) = self.stretcher.as_mut() {
                let staged = self.stage_buf[0].len();
                stretcher.process(&self.stage_buf, staged, &mut self.carry);
            }
        }
        if let Some(stretcher) = self.stretcher.as_mut() {
            stretcher.flush(&mut self.carry);
        }
        self.ended = true;
    }
}

enum Outcome {
    Progress,
    Idle,
    Drained,
}

struct FillWorker {
    shared: Arc<Shared>,
    pipeline: Option<Pipeline>,
}

impl FillWorker {
    fn snapshot(&self) -> Snapshot {
        let shared = &self.shared;
        let mut control = shared.control.lock();
        let seek = control.seek.take();
        let inputs: Vec<MixInput> = control
            .models
            .iter()
            .filter_map(|entry| {
                entry.model.upgrade().map(|model| MixInput {
                    id: entry.id,
                    model,
                })
            })
            .collect();

        let target_rate = shared.target_rate();
        let source_rate = match (control.source_rate, target_rate) {
            (0, 0) => 1,
            (0, target) => target,
            (source, _) => source,
        };
        let stretch = shared.stretch.get();
        let plan = FillPlan {
            model_revision: control.revision,
            param_revision: shared.params.revision(),
            source_rate,
            target_rate: if target_rate == 0 { source_rate } else { target_rate },
            channels: shared.target_channels(),
            stretch,
            mono: stretch != 1.0 && shared.stretch_mono.get(),
            looping: shared.looping.get(),
            quality: control.quality,
            ring_frames: control.ring_frames,
        };

        Snapshot {
            plan,
            inputs,
            ranges: Arc::clone(&control.ranges),
            solo_filter: control.solo_filter.clone(),
            seek,
        }
    }

    fn fill_once(&mut self) -> Outcome {
        let snapshot = self.snapshot();

        if let Some(start) = snapshot.seek {
            self.start_run(start, &snapshot);
        }

        let Some(write_set) = self
            .shared
            .pending
            .load_full()
            .or_else(|| self.shared.active.load_full())
        else {
            self.pipeline = None;
            return Outcome::Idle;
        };

        let armed = self.pipeline.as_ref().map(|p| p.set.generation());
        if armed != Some(write_set.generation()) {
            let position = self.wrap(write_set.start_frame(), &snapshot);
            self.pipeline = Some(Pipeline::new(
                write_set,
                snapshot.plan.clone(),
                position,
                &self.shared.config,
            ));
        }

        if self.pipeline.as_ref().is_some_and(|p| p.plan != snapshot.plan) {
            self.rebuffer(&snapshot);
        }

        let progressed = match self.pipeline.as_mut() {
            Some(pipeline) => pipeline.produce(&snapshot, &self.shared),
            None => false,
        };
        self.try_unify();

        let drained = self.shared.pending.load().is_none()
            && self
                .shared
                .active
                .load_full()
                .is_some_and(|set| set.is_drained());

        if drained {
            Outcome::Drained
        } else if progressed {
            Outcome::Progress
        } else {
            Outcome::Idle
        }
    }

    fn wrap(&self, frame: u64, snapshot: &Snapshot) -> u64 {
        let total = snapshot.ranges.total();
        if snapshot.plan.looping && total > 0 {
            frame % total
        } else {
            frame
        }
    }

    /// Begin a fresh run at `start` after a seek.
    fn start_run(&mut self, start: u64, snapshot: &Snapshot) {
        let plan = snapshot.plan.clone();
        let set = Arc::new(RingBufferSet::new(
            plan.channels,
            plan.ring_frames,
            start,
            plan.step(),
            self.shared.next_generation(),
        ));
        self.shared.retired.retire_buffers(self.shared.pending.swap(None));
        self.shared
            .retired
            .retire_buffers(self.shared.active.swap(Some(Arc::clone(&set))));
        self.shared.short_reads.store(0, Ordering::Relaxed);

        let position = self.wrap(start, snapshot);
        self.pipeline = Some(Pipeline::new(set, plan, position, &self.shared.config));
    }

    /// Refill from the current read head with the latest plan.
    fn rebuffer(&mut self, snapshot: &Snapshot) {
        let Some(active) = self.shared.active.load_full() else {
            return;
        };
        let plan = snapshot.plan.clone();
        let head = active
            .frame_at_read_head()
            .max(active.start_frame() as f64)
            .round() as u64;

        let set = Arc::new(RingBufferSet::new(
            plan.channels,
            plan.ring_frames,
            head,
            plan.step(),
            self.shared.next_generation(),
        ));
        self.shared
            .retired
            .retire_buffers(self.shared.pending.swap(Some(Arc::clone(&set))));

        tracing::debug!(frame = head, generation = set.generation(), "Rebuffering");
        let position = self.wrap(head, snapshot);
        self.pipeline = Some(Pipeline::new(set, plan, position, &self.shared.config));
    }

    /// Swap the pending set in once it covers the active read head.
    ///
    /// Returns whether the swap happened. A seek that clears the read path
    /// in the meantime wins, and the pending set is left to be retired.
    fn try_unify(&mut self) -> bool {
        let Some(pending) = self.shared.pending.load_full() else {
            return false;
        };
        let Some(active) = self.shared.active.load_full() else {
            return false;
        };

        let block = self
            .shared
            .target_block
            .load(Ordering::Acquire)
            .max(self.shared.config.mixer_block_size);
        let behind = active.frame_at_read_head() - pending.start_frame() as f64;
        let skip = (behind / pending.step()).max(0.0) as usize;
        let ready = pending.read_space();
        // A full set cannot get any closer to the head.
        let full = pending.write_space() == 0;
        if ready < skip + 2 * block && !pending.is_finished() && !full {
            return false;
        }
        pending.skip(skip.min(ready));

        let expected = Some(Arc::clone(&active));
        let previous = self
            .shared
            .active
            .compare_and_swap(&expected, Some(Arc::clone(&pending)));
        let swapped = match &*previous {
            Some(set) => Arc::ptr_eq(set, &active),
            None => false,
        };
        if !swapped {
            tracing::debug!(generation = pending.generation(), "Read path changed, dropping rebuffered audio");
            return false;
        }
        drop(previous);

        self.shared
            .pending
            .compare_and_swap(&Some(Arc::clone(&pending)), None);
        self.shared.retired.retire_buffers(expected);
        tracing::debug!(generation = pending.generation(), "Swapped in rebuffered audio");
        true
    }

    /// Publish what the real-time thread flagged since the last pass.
    fn service_notifications(&self) {
        let shared = &self.shared;

        let underrun = shared.underrun_pending.take();
        if underrun {
            let total = shared.underruns.load(Ordering::Acquire);
            tracing::warn!(total, "Playback underrun");
            shared.events.send(PlaybackEvent::Underrun { total });
        }

        // An underrun episode sheds load the same way a target overload does.
        if shared.overload_requested.take() | underrun {
            self.handle_overload();
        }

        if let Some(slot) = shared.effect.load_full() {
            if let Some(elapsed) = slot.take_exceeded() {
                tracing::warn!(?elapsed, "Auditioning effect over budget, bypassing");
                shared
                    .events
                    .send(PlaybackEvent::AuditioningEffectBypassed { elapsed });
            }
        }
    }

    fn handle_overload(&self) {
        let shared = &self.shared;

        if let Some(slot) = shared.effect.load_full() {
            if !slot.is_bypassed() {
                slot.bypass();
                tracing::warn!("Audio overload, bypassing auditioning effect");
                shared.events.send(PlaybackEvent::AudioOverloadPluginDisabled);
                return;
            }
        }

        if shared.stretch.get() < 1.0
            && shared.target_channels() > 1
            && !shared.stretch_mono.get()
        {
            shared.stretch_mono.raise();
            tracing::warn!("Audio overload, time stretching in mono");
            shared
                .events
                .send(PlaybackEvent::AudioTimeStretchMultiChannelDisabled);
        }
    }

    /// End of material reached and played out. Returns whether the thread
    /// should exit.
    fn finish_playback(&mut self, shutdown: &AtomicBool) -> bool {
        let shared = &self.shared;
        {
            let control = shared.control.lock();
            if control.seek.is_some() || shared.pending.load().is_some() {
                return false;
            }
            if !shared.state.transition(PlayState::Playing, PlayState::Ready) {
                return false;
            }
            shutdown.store(true, Ordering::SeqCst);
            // Everything was delivered, so the position rests at the end.
            shared.timing.report_monotonic(control.ranges.end_frame());
        }
        tracing::debug!("Playback reached end of material");
        shared.events.send(PlaybackEvent::PlayStatusChanged(false));
        true
    }

    fn wait_timeout(&self) -> Duration {
        let rate = self.shared.target_rate().max(1) as u64;
        let ring = self
            .pipeline
            .as_ref()
            .map_or(self.shared.config.ring_buffer_frames, |p| p.set.capacity());
        let ring_ms = ring as u64 * 1000 / rate;
        let max_ms = self.shared.config.max_fill_wait_ms.max(1);
        Duration::from_millis((ring_ms / 10).clamp(1, max_ms))
    }
}

pub(super) fn fill_loop(shared: Arc<Shared>, shutdown: Arc<AtomicBool>) {
    tracing::debug!("Fill thread started");
    let mut worker = FillWorker {
        shared: Arc::clone(&shared),
        pipeline: None,
    };

    loop {
        if shutdown.load(Ordering::SeqCst) || shared.state.get() != PlayState::Playing {
            break;
        }

        shared.retired.scavenge();
        worker.service_notifications();

        match worker.fill_once() {
            Outcome::Progress => {}
            Outcome::Idle => shared.wake.wait(worker.wait_timeout()),
            Outcome::Drained => {
                if worker.finish_playback(&shutdown) {
                    break;
                }
                shared.wake.wait(worker.wait_timeout());
            }
        }
    }

    drop(worker);
    shared.retired.scavenge();
    tracing::debug!("Fill thread exiting");
}
