//! Sweep of chunks the factory scan could not discover
//!
//! Some chunks are requested through loader calls the call-site grammar cannot
//! see (dynamically built ids, language packs). After convergence every id
//! the asset-path function knows about, and that classification never saw,
//! is probed on its own and ensured unless it is a worker asset.

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::classify::probe_chunk;
use super::{pattern, ChunkId, Session};
use crate::error::{LoaderError, Result};

/// Result of the residual sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResidualOutcome {
    /// Size of the chunk universe parsed from the asset-path function
    pub universe: usize,
    /// Ids absent from both classification sets
    pub chunks_left: Vec<ChunkId>,
    pub loaded: Vec<ChunkId>,
    pub workers: Vec<ChunkId>,
    pub without_asset: Vec<ChunkId>,
    pub failed: Vec<ChunkId>,
}

enum SweptChunk {
    Loaded,
    Worker,
    NoAsset,
}

/// Load every known chunk that classification did not cover
pub(super) async fn sweep(session: &Session) -> Result<ResidualOutcome> {
    let universe = pattern::parse_chunk_universe(&session.host.asset_path_source());
    if universe.is_empty() {
        return Err(LoaderError::EmptyChunkUniverse);
    }

    let chunks_left = session.state.sets.lock().chunks_left(&universe);
    info!(
        "{} of {} known chunks left after scanning factories",
        chunks_left.len(),
        universe.len()
    );

    let results = join_all(chunks_left.iter().map(|&id| sweep_chunk(session, id))).await;

    let mut outcome = ResidualOutcome {
        universe: universe.len(),
        chunks_left: chunks_left.clone(),
        ..Default::default()
    };

    for (&id, result) in chunks_left.iter().zip(results) {
        match result {
            Ok(SweptChunk::Loaded) => outcome.loaded.push(id),
            Ok(SweptChunk::Worker) => outcome.workers.push(id),
            Ok(SweptChunk::NoAsset) => outcome.without_asset.push(id),
            Err(e) => {
                warn!("Failed to load residual chunk {}: {}", id, e);
                outcome.failed.push(id);
            }
        }
    }

    Ok(outcome)
}

async fn sweep_chunk(session: &Session, id: ChunkId) -> Result<SweptChunk> {
    match probe_chunk(session, id).await? {
        None => {
            debug!("Residual chunk {} has no asset", id);
            Ok(SweptChunk::NoAsset)
        }
        Some(true) => Ok(SweptChunk::Worker),
        Some(false) => {
            session.host.ensure_chunk(id).await?;
            Ok(SweptChunk::Loaded)
        }
    }
}
