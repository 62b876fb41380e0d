//! Per-model play parameters.

use crate::model::ModelId;
use dashmap::DashMap;
use ripieno_core::{AtomicFlag, AtomicFloat};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Gain, pan, mute and solo for one model.
///
/// Every setter bumps the owning repository's revision so the fill thread
/// can tell buffered audio is stale.
#[derive(Debug)]
pub struct PlayParameters {
    gain: AtomicFloat,
    pan: AtomicFloat,
    muted: AtomicFlag,
    solo: AtomicFlag,
    revision: Arc<AtomicU64>,
}

impl PlayParameters {
    fn new(revision: Arc<AtomicU64>) -> Self {
        Self {
            gain: AtomicFloat::new(1.0),
            pan: AtomicFloat::new(0.0),
            muted: AtomicFlag::new(false),
            solo: AtomicFlag::new(false),
            revision,
        }
    }

    fn touch(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    pub fn gain(&self) -> f32 {
        self.gain.get()
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.set(gain.max(0.0));
        self.touch();
    }

    /// -1.0 (left) to 1.0 (right).
    pub fn pan(&self) -> f32 {
        self.pan.get()
    }

    pub fn set_pan(&self, pan: f32) {
        self.pan.set(pan.clamp(-1.0, 1.0));
        self.touch();
    }

    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.set(muted);
        self.touch();
    }

    pub fn is_solo(&self) -> bool {
        self.solo.get()
    }

    pub fn set_solo(&self, solo: bool) {
        self.solo.set(solo);
        self.touch();
    }
}

/// Snapshot of one model's parameters taken at a block boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub gain: f32,
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pan: 0.0,
            muted: false,
            solo: false,
        }
    }
}

impl From<&PlayParameters> for ParameterSnapshot {
    fn from(params: &PlayParameters) -> Self {
        Self {
            gain: params.gain(),
            pan: params.pan(),
            muted: params.is_muted(),
            solo: params.is_solo(),
        }
    }
}

/// Parameters for every model, looked up by identity.
#[derive(Debug, Default)]
pub struct PlayParameterRepository {
    params: DashMap<ModelId, Arc<PlayParameters>>,
    revision: Arc<AtomicU64>,
}

impl PlayParameterRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, id: ModelId) -> Arc<PlayParameters> {
        self.params
            .entry(id)
            .or_insert_with(|| {
                self.revision.fetch_add(1, Ordering::AcqRel);
                Arc::new(PlayParameters::new(Arc::clone(&self.revision)))
            })
            .clone()
    }

    pub fn get(&self, id: ModelId) -> Option<Arc<PlayParameters>> {
        self.params.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn snapshot(&self, id: ModelId) -> ParameterSnapshot {
        self.params
            .get(&id)
            .map(|entry| ParameterSnapshot::from(entry.value().as_ref()))
            .unwrap_or_default()
    }

    pub fn remove(&self, id: ModelId) -> Option<Arc<PlayParameters>> {
        let removed = self.params.remove(&id).map(|(_, params)| params);
        if removed.is_some() {
            self.revision.fetch_add(1, Ordering::AcqRel);
        }
        removed
    }

    /// Increases whenever any parameter changes.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}
