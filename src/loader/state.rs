//! Per-call loader state

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use super::ChunkId;

/// Classification sets shared by every pipeline of one call.
///
/// An id lands in at most one set and never leaves it.
#[derive(Debug, Default)]
pub struct ChunkSets {
    valid: HashSet<ChunkId>,
    invalid: HashSet<ChunkId>,
}

impl ChunkSets {
    /// Record `id` as loaded through an eligible group
    pub fn mark_valid(&mut self, id: ChunkId) -> bool {
        !self.invalid.contains(&id) && self.valid.insert(id)
    }

    /// Record `id` as excluded from loading
    pub fn mark_invalid(&mut self, id: ChunkId) -> bool {
        !self.valid.contains(&id) && self.invalid.insert(id)
    }

    pub fn is_classified(&self, id: ChunkId) -> bool {
        self.valid.contains(&id) || self.invalid.contains(&id)
    }

    pub fn is_valid(&self, id: ChunkId) -> bool {
        self.valid.contains(&id)
    }

    pub fn is_invalid(&self, id: ChunkId) -> bool {
        self.invalid.contains(&id)
    }

    /// Ids of `universe` absent from both sets, in universe order
    pub fn chunks_left(&self, universe: &[ChunkId]) -> Vec<ChunkId> {
        universe
            .iter()
            .copied()
            .filter(|id| !self.is_classified(*id))
            .collect()
    }

    pub fn valid_sorted(&self) -> BTreeSet<ChunkId> {
        self.valid.iter().copied().collect()
    }

    pub fn invalid_sorted(&self) -> BTreeSet<ChunkId> {
        self.invalid.iter().copied().collect()
    }
}

/// Counters updated by pipelines
#[derive(Debug, Default)]
pub struct LoadStats {
    pub factories_scanned: AtomicUsize,
    pub groups_found: AtomicUsize,
    pub groups_loaded: AtomicUsize,
    pub groups_discarded: AtomicUsize,
    pub groups_failed: AtomicUsize,
    pub entrypoints_required: AtomicUsize,
    pub entrypoint_failures: AtomicUsize,
}

impl LoadStats {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }
}

/// All mutable state of one `load_lazy_chunks` call
#[derive(Debug, Default)]
pub struct LoadState {
    pub sets: Mutex<ChunkSets>,
    /// Worker-ness of every chunk probed so far, shared with in-flight probes
    pub verdicts: DashMap<ChunkId, Arc<OnceCell<bool>>>,
    pub stats: LoadStats,
}

impl LoadState {
    pub fn new() -> Self {
        Self::default()
    }
}
