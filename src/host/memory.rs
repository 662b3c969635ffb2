//! In-process module host
//!
//! A scriptable stand-in for a live webpack runtime: factories, asset paths and
//! the factories each chunk carries are declared up front, and every
//! `ensure_chunk`/`require` call is recorded for inspection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{FactoryListener, ListenerId, ModuleHost};
use crate::loader::{ChunkId, ModuleId};

/// Factories registered when a chunk is executed
#[derive(Debug, Clone, Default)]
pub struct ChunkPayload {
    pub factories: Vec<(ModuleId, String)>,
}

impl ChunkPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory(mut self, id: ModuleId, source: impl Into<String>) -> Self {
        self.factories.push((id, source.into()));
        self
    }
}

/// Module host backed by plain maps
#[derive(Default)]
pub struct MemoryHost {
    public_path: String,
    asset_path_source: String,
    assets: HashMap<ChunkId, String>,
    payloads: HashMap<ChunkId, ChunkPayload>,
    /// Factories a module registers as a side effect of being required
    require_effects: HashMap<ModuleId, ChunkPayload>,
    failing_requires: HashSet<ModuleId>,
    failing_chunks: HashSet<ChunkId>,

    factories: RwLock<BTreeMap<ModuleId, String>>,
    listeners: Mutex<Vec<(ListenerId, FactoryListener)>>,
    next_listener: AtomicU64,
    executed_chunks: Mutex<HashSet<ChunkId>>,
    ensured: Mutex<Vec<ChunkId>>,
    required: Mutex<Vec<ModuleId>>,
}

impl MemoryHost {
    /// Create an empty host
    pub fn new(public_path: impl Into<String>, asset_path_source: impl Into<String>) -> Self {
        Self {
            public_path: public_path.into(),
            asset_path_source: asset_path_source.into(),
            ..Default::default()
        }
    }

    /// Register a factory before loading starts
    pub fn with_factory(self, id: ModuleId, source: impl Into<String>) -> Self {
        self.factories.write().insert(id, source.into());
        self
    }

    /// Map a chunk to its relative asset path
    pub fn with_asset(mut self, chunk: ChunkId, path: impl Into<String>) -> Self {
        self.assets.insert(chunk, path.into());
        self
    }

    /// Declare the factories a chunk registers when ensured
    pub fn with_chunk_payload(mut self, chunk: ChunkId, payload: ChunkPayload) -> Self {
        self.payloads.insert(chunk, payload);
        self
    }

    /// Declare the factories a module registers when required
    pub fn with_require_effect(mut self, id: ModuleId, payload: ChunkPayload) -> Self {
        self.require_effects.insert(id, payload);
        self
    }

    /// Make requiring `id` fail as if its code threw
    pub fn with_failing_require(mut self, id: ModuleId) -> Self {
        self.failing_requires.insert(id);
        self
    }

    /// Make ensuring `chunk` fail as if its script failed to load
    pub fn with_failing_chunk(mut self, chunk: ChunkId) -> Self {
        self.failing_chunks.insert(chunk);
        self
    }

    /// Register a factory and notify listeners
    pub fn register_factory(&self, id: ModuleId, source: &str) {
        self.factories.write().insert(id, source.to_string());

        let listeners: Vec<FactoryListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(id, source);
        }
    }

    /// Every `ensure_chunk` call, in call order
    pub fn ensured_chunks(&self) -> Vec<ChunkId> {
        self.ensured.lock().clone()
    }

    /// Every successful `require` call, in call order
    pub fn required_modules(&self) -> Vec<ModuleId> {
        self.required.lock().clone()
    }

    /// Number of currently subscribed listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn register_payload(&self, payload: &ChunkPayload) {
        for (id, source) in &payload.factories {
            self.register_factory(*id, source);
        }
    }
}

#[async_trait]
impl ModuleHost for MemoryHost {
    fn require(&self, id: ModuleId) -> Result<()> {
        if !self.has_factory(id) {
            bail!("Cannot find module '{}'", id);
        }
        if self.failing_requires.contains(&id) {
            bail!("module {} threw during initialization", id);
        }

        self.required.lock().push(id);

        if let Some(payload) = self.require_effects.get(&id) {
            self.register_payload(payload);
        }

        Ok(())
    }

    async fn ensure_chunk(&self, id: ChunkId) -> Result<()> {
        self.ensured.lock().push(id);
        tokio::task::yield_now().await;

        if self.failing_chunks.contains(&id) {
            bail!("Loading chunk {} failed", id);
        }

        // Already executed chunks resolve without running again
        if !self.executed_chunks.lock().insert(id) {
            return Ok(());
        }

        debug!("Executing chunk {}", id);
        if let Some(payload) = self.payloads.get(&id) {
            self.register_payload(payload);
        }

        Ok(())
    }

    fn asset_path(&self, id: ChunkId) -> Option<String> {
        self.assets.get(&id).cloned()
    }

    fn asset_path_source(&self) -> String {
        self.asset_path_source.clone()
    }

    fn public_path(&self) -> String {
        self.public_path.clone()
    }

    fn factories(&self) -> Vec<(ModuleId, String)> {
        self.factories
            .read()
            .iter()
            .map(|(id, source)| (*id, source.clone()))
            .collect()
    }

    fn has_factory(&self, id: ModuleId) -> bool {
        self.factories.read().contains_key(&id)
    }

    fn add_factory_listener(&self, listener: FactoryListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove_factory_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
    }
}
