//! State shared between the control surface, the fill thread and the
//! real-time callback.

use super::auditioning::AuditioningSlot;
use super::ranges::PlayRanges;
use super::state::{AtomicPlayState, PlayState};
use super::timing::Timing;
use crate::config::PlaybackConfig;
use crate::events::{EventSender, PlaybackEvent};
use crate::fill::{FillThread, FillWake, RetireQueue, Retired};
use crate::model::{Model, ModelId};
use crate::params::PlayParameterRepository;
use crate::resample::ResampleQuality;
use crate::ring_buffer::RingBufferSet;
use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use ripieno_core::{AtomicDouble, AtomicFlag, OutputLevels, TargetBinding};
use std::collections::HashSet;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Channels offered to a target even for mono material.
pub(crate) const MIN_TARGET_CHANNELS: usize = 2;

pub(crate) struct ModelEntry {
    pub(crate) id: ModelId,
    pub(crate) model: Weak<dyn Model>,
    pub(crate) sample_rate: u32,
    pub(crate) end_frame: u64,
}

/// Everything guarded by the control lock. Never touched by the real-time
/// thread.
pub(crate) struct Control {
    pub(crate) models: Vec<ModelEntry>,
    pub(crate) revision: u64,
    pub(crate) source_rate: u32,
    pub(crate) source_channels: usize,
    pub(crate) end_frame: u64,
    pub(crate) selection: Vec<Range<u64>>,
    pub(crate) ranges: Arc<PlayRanges>,
    pub(crate) solo_filter: Option<Arc<HashSet<ModelId>>>,
    pub(crate) quality: ResampleQuality,
    pub(crate) ring_frames: usize,
    pub(crate) target: Option<TargetBinding>,
    pub(crate) block_size: usize,
    pub(crate) seek: Option<u64>,
    pub(crate) fill: Option<FillThread>,
    pub(crate) reported_mismatches: HashSet<(u32, u32)>,
}

impl Control {
    fn new(config: &PlaybackConfig) -> Self {
        Self {
            models: Vec::new(),
            revision: 0,
            source_rate: 0,
            source_channels: 0,
            end_frame: 0,
            selection: Vec::new(),
            ranges: Arc::new(PlayRanges::default()),
            solo_filter: None,
            quality: config.resample_quality,
            ring_frames: config.ring_buffer_frames,
            target: None,
            block_size: 0,
            seek: None,
            fill: None,
            reported_mismatches: HashSet::new(),
        }
    }

    pub(crate) fn recompute_end_frame(&mut self) {
        self.end_frame = self.models.iter().map(|m| m.end_frame).max().unwrap_or(0);
        self.rebuild_ranges();
    }

    pub(crate) fn rebuild_ranges(&mut self) {
        let ranges = PlayRanges::new(&self.selection, self.end_frame);
        if *self.ranges != ranges {
            self.ranges = Arc::new(ranges);
        }
    }

    /// Report a source/target rate difference once per pair.
    pub(crate) fn note_target_mismatch(&mut self, target_rate: u32) -> Option<PlaybackEvent> {
        let source = self.source_rate;
        if source == 0 || target_rate == 0 || source == target_rate {
            return None;
        }
        self.reported_mismatches
            .insert((source, target_rate))
            .then_some(PlaybackEvent::SampleRateMismatch {
                requested: source,
                available: target_rate,
                will_resample: true,
            })
    }
}

pub(crate) struct Shared {
    pub(crate) config: PlaybackConfig,
    pub(crate) control: Mutex<Control>,
    pub(crate) params: Arc<PlayParameterRepository>,
    pub(crate) state: AtomicPlayState,

    pub(crate) active: ArcSwapOption<RingBufferSet>,
    pub(crate) pending: ArcSwapOption<RingBufferSet>,
    pub(crate) effect: ArcSwapOption<AuditioningSlot>,
    pub(crate) retired: RetireQueue,
    generation: AtomicU64,

    pub(crate) events: EventSender,
    pub(crate) wake: Arc<FillWake>,

    pub(crate) target_rate: AtomicU32,
    pub(crate) target_latency: AtomicU64,
    pub(crate) target_block: AtomicUsize,
    pub(crate) target_channels: AtomicUsize,
    pub(crate) end_frame: AtomicU64,
    pub(crate) ranges: ArcSwap<PlayRanges>,
    pub(crate) stretch: AtomicDouble,
    pub(crate) stretch_mono: AtomicFlag,
    pub(crate) looping: AtomicFlag,

    pub(crate) timing: Timing,
    pub(crate) short_reads: AtomicU32,
    pub(crate) underruns: AtomicU64,
    pub(crate) underrun_pending: AtomicFlag,
    pub(crate) overload_requested: AtomicFlag,
    pub(crate) source_levels: OutputLevels,
    pub(crate) output_levels: OutputLevels,
}

impl Shared {
    pub(crate) fn new(
        config: PlaybackConfig,
        params: Arc<PlayParameterRepository>,
        events: EventSender,
    ) -> Self {
        Self {
            control: Mutex::new(Control::new(&config)),
            config,
            params,
            state: AtomicPlayState::new(PlayState::Idle),
            active: ArcSwapOption::empty(),
            pending: ArcSwapOption::empty(),
            effect: ArcSwapOption::empty(),
            retired: RetireQueue::new(),
            generation: AtomicU64::new(0),
            events,
            wake: Arc::new(FillWake::new()),
            target_rate: AtomicU32::new(0),
            target_latency: AtomicU64::new(0),
            target_block: AtomicUsize::new(0),
            target_channels: AtomicUsize::new(MIN_TARGET_CHANNELS),
            end_frame: AtomicU64::new(0),
            ranges: ArcSwap::from_pointee(PlayRanges::default()),
            stretch: AtomicDouble::new(1.0),
            stretch_mono: AtomicFlag::new(false),
            looping: AtomicFlag::new(false),
            timing: Timing::new(),
            short_reads: AtomicU32::new(0),
            underruns: AtomicU64::new(0),
            underrun_pending: AtomicFlag::new(false),
            overload_requested: AtomicFlag::new(false),
            source_levels: OutputLevels::new(),
            output_levels: OutputLevels::new(),
        }
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn target_rate(&self) -> u32 {
        self.target_rate.load(Ordering::Acquire)
    }

    pub(crate) fn target_channels(&self) -> usize {
        self.target_channels.load(Ordering::Acquire)
    }

    pub(crate) fn wake_fill(&self) {
        self.wake.notify();
    }

    /// Drop both buffer sets from the read path.
    pub(crate) fn clear_buffers(&self) {
        self.retired.retire_buffers(self.active.swap(None));
        self.retired.retire_buffers(self.pending.swap(None));
    }

    pub(crate) fn replace_effect(&self, slot: Option<Arc<AuditioningSlot>>) {
        if let Some(old) = self.effect.swap(slot) {
            self.retired.retire(Retired::Effect(old));
        }
    }

    /// Mirror control state the real-time side and timing need.
    pub(crate) fn publish(&self, control: &Control) {
        self.end_frame.store(control.end_frame, Ordering::Release);
        self.ranges.store(Arc::clone(&control.ranges));
        self.target_channels.store(
            control.source_channels.max(MIN_TARGET_CHANNELS),
            Ordering::Release,
        );
    }

    /// Restart the run at `start`, moved into the play ranges. Returns the
    /// frame it starts from.
    pub(crate) fn seek_locked(&self, control: &mut Control, start: u64) -> u64 {
        let start = control.ranges.constrain(start);
        let offset = control.ranges.offset_of(start);
        control.seek = Some(offset);
        self.clear_buffers();
        self.timing.reset(offset, start);
        self.short_reads.store(0, Ordering::Relaxed);
        start
    }

    pub(crate) fn send(&self, events: impl IntoIterator<Item = PlaybackEvent>) {
        for event in events {
            self.events.send(event);
        }
    }
}
