//! Module host interface
//!
//! The loader never touches the bundler runtime directly; it goes through
//! [`ModuleHost`], which exposes the handful of webpack runtime operations it
//! needs (`require`, `require.e`, `require.u`, `require.p`, `require.m` and the
//! factory-registration hook).

mod memory;
mod snapshot;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::loader::{ChunkId, ModuleId};

pub use memory::{ChunkPayload, MemoryHost};
pub use snapshot::{Snapshot, SnapshotHost};

/// Callback invoked once per newly registered factory, before instantiation.
///
/// Receives the module id and the stringified factory.
pub type FactoryListener = Arc<dyn Fn(ModuleId, &str) + Send + Sync>;

/// Handle returned when subscribing a [`FactoryListener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// The bundler runtime the loader drives
#[async_trait]
pub trait ModuleHost: Send + Sync {
    /// Instantiate a registered module. Errors if the module's own code fails.
    fn require(&self, id: ModuleId) -> Result<()>;

    /// Fetch and execute the code of a chunk
    async fn ensure_chunk(&self, id: ChunkId) -> Result<()>;

    /// Relative asset URL for a chunk, if the bundler knows one
    fn asset_path(&self, id: ChunkId) -> Option<String>;

    /// Source text of the bundler's asset-path function
    fn asset_path_source(&self) -> String;

    /// Prefix prepended to asset paths to form a fetchable URL
    fn public_path(&self) -> String;

    /// Snapshot of the factory table as `(id, stringified factory)` pairs
    fn factories(&self) -> Vec<(ModuleId, String)>;

    /// Whether a factory is registered for `id`
    fn has_factory(&self, id: ModuleId) -> bool;

    /// Subscribe to factory registrations
    fn add_factory_listener(&self, listener: FactoryListener) -> ListenerId;

    /// Unsubscribe a listener added with [`ModuleHost::add_factory_listener`]
    fn remove_factory_listener(&self, id: ListenerId);
}

/// Resolve the fetchable asset URL of a chunk.
///
/// Returns `None` for chunks without an asset, including webpack's
/// `"undefined.js"` placeholder.
pub fn chunk_asset_url(host: &dyn ModuleHost, id: ChunkId) -> Option<String> {
    let path = host.asset_path(id)?;
    if path == "undefined.js" {
        return None;
    }
    Some(format!("{}{}", host.public_path(), path))
}
