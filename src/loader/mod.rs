//! Lazy chunk loader
//!
//! Forces a webpack-bundled application to load every code-split chunk up
//! front:
//! 1. every module factory (already registered or registered while we run)
//!    is scanned for lazy-load call sites
//! 2. each call site's chunks are probed; groups containing a worker asset
//!    are discarded, the rest are ensured and their entrypoint required
//! 3. once every scan has settled, chunks the scan could not see are swept
//!    up from the bundler's asset-path function

mod classify;
mod pattern;
mod residual;
mod state;
mod tracker;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};

use crate::config::LoaderConfig;
use crate::error::Result;
use crate::fetch::AssetFetcher;
use crate::host::ModuleHost;

pub use classify::GroupOutcome;
pub use pattern::{extract_chunk_groups, parse_chunk_ids, parse_chunk_universe};
pub use residual::ResidualOutcome;
pub use state::{ChunkSets, LoadState, LoadStats};
pub use tracker::{Convergence, PipelineGuard};

/// Identifier of a bundler-managed chunk
pub type ChunkId = u64;

/// Identifier of a host module (factory-table key and `require` argument)
pub type ModuleId = u64;

/// Chunks loaded by one lazy-load call site, and the module it requires after
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChunkGroup {
    pub chunk_ids: Vec<ChunkId>,
    pub entry_point: ModuleId,
}

/// Summary of one `load_lazy_chunks` call
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub factories_scanned: usize,
    pub groups_found: usize,
    pub groups_loaded: usize,
    pub groups_discarded: usize,
    pub groups_failed: usize,
    pub entrypoints_required: usize,
    pub entrypoint_failures: usize,
    pub valid_chunks: BTreeSet<ChunkId>,
    pub invalid_chunks: BTreeSet<ChunkId>,
    pub residual: ResidualOutcome,
    pub elapsed: Duration,
}

/// Everything a pipeline needs, scoped to one call
pub(crate) struct Session {
    pub host: Arc<dyn ModuleHost>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub worker_marker: String,
    pub state: LoadState,
}

/// Drives a [`ModuleHost`] until every lazy chunk is loaded
pub struct LazyChunkLoader {
    host: Arc<dyn ModuleHost>,
    fetcher: Arc<dyn AssetFetcher>,
    config: LoaderConfig,
}

impl LazyChunkLoader {
    /// Create a new loader
    pub fn new(
        host: Arc<dyn ModuleHost>,
        fetcher: Arc<dyn AssetFetcher>,
        config: LoaderConfig,
    ) -> Self {
        Self { host, fetcher, config }
    }

    /// Load all chunks, logging instead of failing.
    ///
    /// Returns `None` if a fatal error occurred; the error has been logged.
    ///
    /// # Panics
    ///
    /// Scan pipelines are spawned onto the current tokio runtime, so this must
    /// be polled from within one.
    pub async fn load_lazy_chunks(&self) -> Option<LoadReport> {
        match self.try_load_lazy_chunks().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("A fatal error occurred: {}", e);
                None
            }
        }
    }

    /// Load all chunks, returning the fatal error if there is one
    pub async fn try_load_lazy_chunks(&self) -> Result<LoadReport> {
        let start = Instant::now();
        info!("Loading all chunks...");

        // Fresh state per call, so concurrent calls never share sets
        let session = Arc::new(Session {
            host: self.host.clone(),
            fetcher: self.fetcher.clone(),
            worker_marker: self.config.worker_marker.clone(),
            state: LoadState::new(),
        });

        tracker::scan_until_converged(session.clone()).await;

        let residual = residual::sweep(&session).await?;

        let stats = &session.state.stats;
        let (valid_chunks, invalid_chunks) = {
            let sets = session.state.sets.lock();
            (sets.valid_sorted(), sets.invalid_sorted())
        };

        let report = LoadReport {
            factories_scanned: LoadStats::get(&stats.factories_scanned),
            groups_found: LoadStats::get(&stats.groups_found),
            groups_loaded: LoadStats::get(&stats.groups_loaded),
            groups_discarded: LoadStats::get(&stats.groups_discarded),
            groups_failed: LoadStats::get(&stats.groups_failed),
            entrypoints_required: LoadStats::get(&stats.entrypoints_required),
            entrypoint_failures: LoadStats::get(&stats.entrypoint_failures),
            valid_chunks,
            invalid_chunks,
            residual,
            elapsed: start.elapsed(),
        };

        info!("Finished loading all chunks!");
        Ok(report)
    }
}

/// Load every lazy chunk of `host` with the given fetcher.
///
/// Must be polled from within a tokio runtime.
pub async fn load_lazy_chunks(
    host: Arc<dyn ModuleHost>,
    fetcher: Arc<dyn AssetFetcher>,
    config: LoaderConfig,
) -> Option<LoadReport> {
    LazyChunkLoader::new(host, fetcher, config)
        .load_lazy_chunks()
        .await
}
