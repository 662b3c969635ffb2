//! Chunk classification and group loading

use futures_util::future::{join_all, try_join_all};
use serde::Serialize;
use tracing::{debug, error, warn};

use super::state::LoadStats;
use super::{pattern, ChunkGroup, ChunkId, ModuleId, Session};
use crate::error::{LoaderError, Result};
use crate::fetch::is_worker_asset;
use crate::host::chunk_asset_url;

/// What happened to one chunk group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupOutcome {
    /// Chunks ensured and entrypoint handled
    Loaded,
    /// A chunk was a worker asset; nothing loaded
    Discarded,
}

/// Whether a chunk is a worker asset.
///
/// `Ok(None)` means the chunk has no asset and is not a real loadable chunk.
/// Concurrent probes of one id share a single fetch.
pub(super) async fn probe_chunk(session: &Session, id: ChunkId) -> Result<Option<bool>> {
    let Some(url) = chunk_asset_url(session.host.as_ref(), id) else {
        return Ok(None);
    };

    // Clone the cell out so no map guard is held across the fetch
    let cell = session.state.verdicts.entry(id).or_default().clone();
    let is_worker = cell
        .get_or_try_init(|| async {
            let body = session
                .fetcher
                .fetch_text(&url)
                .await
                .map_err(|e| LoaderError::Fetch {
                    url: url.clone(),
                    message: format!("{:#}", e),
                })?;
            Ok::<_, LoaderError>(is_worker_asset(&body, &session.worker_marker))
        })
        .await?;

    Ok(Some(*is_worker))
}

/// Run extraction and group loading for one factory
pub(super) async fn scan_factory(session: &Session, module: ModuleId, source: &str) {
    LoadStats::bump(&session.state.stats.factories_scanned);

    let groups = pattern::extract_chunk_groups(source);
    if groups.is_empty() {
        return;
    }
    debug!("Factory {} references {} lazy chunk group(s)", module, groups.len());

    let outcomes = join_all(groups.iter().map(|group| process_group(session, group))).await;

    for (group, outcome) in groups.iter().zip(outcomes) {
        if let Err(e) = outcome {
            LoadStats::bump(&session.state.stats.groups_failed);
            warn!(
                "Chunk group {:?} -> {} of factory {} failed: {}",
                group.chunk_ids, group.entry_point, module, e
            );
        }
    }
}

/// Classify a group's chunks and, if none is a worker, load it
pub(super) async fn process_group(session: &Session, group: &ChunkGroup) -> Result<GroupOutcome> {
    let stats = &session.state.stats;
    LoadStats::bump(&stats.groups_found);

    let probes = join_all(group.chunk_ids.iter().map(|&id| probe_chunk(session, id))).await;

    let mut verdicts = Vec::with_capacity(probes.len());
    let mut first_error = None;
    for (&id, probe) in group.chunk_ids.iter().zip(probes) {
        match probe {
            Ok(Some(is_worker)) => verdicts.push((id, is_worker)),
            Ok(None) => {}
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    let eligible = verdicts.iter().all(|(_, is_worker)| !is_worker);

    {
        let mut sets = session.state.sets.lock();
        for &(id, is_worker) in &verdicts {
            if is_worker || !eligible {
                sets.mark_invalid(id);
            } else if first_error.is_none() {
                sets.mark_valid(id);
            }
        }
    }

    if !eligible {
        LoadStats::bump(&stats.groups_discarded);
        debug!("Discarding chunk group {:?}: contains a worker asset", group.chunk_ids);
        return Ok(GroupOutcome::Discarded);
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    try_join_all(group.chunk_ids.iter().map(|&id| session.host.ensure_chunk(id)))
        .await
        .map_err(LoaderError::from)?;

    let entry_point = group.entry_point;
    if session.host.has_factory(entry_point) {
        match session.host.require(entry_point) {
            Ok(()) => LoadStats::bump(&stats.entrypoints_required),
            Err(e) => {
                LoadStats::bump(&stats.entrypoint_failures);
                error!("Failed to require entrypoint {}: {:#}", entry_point, e);
            }
        }
    } else {
        debug!("Entrypoint {} is not registered, skipping", entry_point);
    }

    LoadStats::bump(&stats.groups_loaded);
    Ok(GroupOutcome::Loaded)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fetch::MemoryFetcher;
    use crate::host::MemoryHost;
    use crate::loader::LoadState;

    const WORKER: &str = r#"importScripts("/assets/x.js")"#;
    const BUNDLE: &str = r#"(this.webpackChunk=this.webpackChunk||[]).push([[1],{}])"#;

    fn session(host: MemoryHost, fetcher: MemoryFetcher) -> (Arc<MemoryHost>, Session) {
        let host = Arc::new(host);
        let session = Session {
            host: host.clone(),
            fetcher: Arc::new(fetcher),
            worker_marker: "importScripts(".to_string(),
            state: LoadState::new(),
        };
        (host, session)
    }

    #[tokio::test]
    async fn test_eligible_group_loads_and_requires() {
        let (host, session) = session(
            MemoryHost::new("/assets/", "")
                .with_asset(12, "12.js")
                .with_asset(34, "34.js")
                .with_factory(56, "function(){}"),
            MemoryFetcher::new()
                .with_body("/assets/12.js", BUNDLE)
                .with_body("/assets/34.js", BUNDLE),
        );

        let group = ChunkGroup { chunk_ids: vec![12, 34], entry_point: 56 };
        let outcome = process_group(&session, &group).await.unwrap();

        assert_eq!(outcome, GroupOutcome::Loaded);
        let mut ensured = host.ensured_chunks();
        ensured.sort();
        assert_eq!(ensured, vec![12, 34]);
        assert_eq!(host.required_modules(), vec![56]);
        assert!(session.state.sets.lock().is_valid(12));
    }

    #[tokio::test]
    async fn test_worker_discards_whole_group() {
        let (host, session) = session(
            MemoryHost::new("/assets/", "")
                .with_asset(12, "12.js")
                .with_asset(34, "34.js")
                .with_factory(56, "function(){}"),
            MemoryFetcher::new()
                .with_body("/assets/12.js", BUNDLE)
                .with_body("/assets/34.js", WORKER),
        );

        let group = ChunkGroup { chunk_ids: vec![12, 34], entry_point: 56 };
        let outcome = process_group(&session, &group).await.unwrap();

        assert_eq!(outcome, GroupOutcome::Discarded);
        assert!(host.ensured_chunks().is_empty());
        assert!(host.required_modules().is_empty());

        let sets = session.state.sets.lock();
        assert!(sets.is_invalid(34));
        assert!(!sets.is_valid(12));
    }

    #[tokio::test]
    async fn test_chunks_without_asset_are_skipped() {
        let (host, session) = session(
            MemoryHost::new("/assets/", "")
                .with_asset(1, "1.js")
                .with_asset(2, "undefined.js")
                .with_factory(9, "function(){}"),
            MemoryFetcher::new().with_body("/assets/1.js", BUNDLE),
        );

        let group = ChunkGroup { chunk_ids: vec![1, 2, 3], entry_point: 9 };
        process_group(&session, &group).await.unwrap();

        let sets = session.state.sets.lock();
        assert!(sets.is_valid(1));
        assert!(!sets.is_classified(2));
        assert!(!sets.is_classified(3));
        assert_eq!(host.required_modules(), vec![9]);
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_group() {
        let (host, session) = session(
            MemoryHost::new("/assets/", "")
                .with_asset(1, "1.js")
                .with_asset(2, "2.js")
                .with_factory(9, "function(){}"),
            MemoryFetcher::new().with_body("/assets/1.js", BUNDLE),
        );

        let group = ChunkGroup { chunk_ids: vec![1, 2], entry_point: 9 };
        let err = process_group(&session, &group).await.unwrap_err();

        assert!(matches!(err, LoaderError::Fetch { .. }));
        assert!(host.ensured_chunks().is_empty());
        assert!(host.required_modules().is_empty());
    }

    #[tokio::test]
    async fn test_missing_or_throwing_entrypoint_is_suppressed() {
        let (host, session) = session(
            MemoryHost::new("/assets/", "")
                .with_asset(1, "1.js")
                .with_factory(8, "function(){}")
                .with_failing_require(8),
            MemoryFetcher::new().with_body("/assets/1.js", BUNDLE),
        );

        let missing = ChunkGroup { chunk_ids: vec![1], entry_point: 7 };
        let throwing = ChunkGroup { chunk_ids: vec![1], entry_point: 8 };

        assert_eq!(process_group(&session, &missing).await.unwrap(), GroupOutcome::Loaded);
        assert_eq!(process_group(&session, &throwing).await.unwrap(), GroupOutcome::Loaded);
        assert!(host.required_modules().is_empty());
        assert_eq!(LoadStats::get(&session.state.stats.entrypoint_failures), 1);
    }

    #[tokio::test]
    async fn test_probe_is_cached() {
        let fetcher = Arc::new(MemoryFetcher::new().with_body("/assets/1.js", BUNDLE));
        let session = Session {
            host: Arc::new(MemoryHost::new("/assets/", "").with_asset(1, "1.js")),
            fetcher: fetcher.clone(),
            worker_marker: "importScripts(".to_string(),
            state: LoadState::new(),
        };

        assert_eq!(probe_chunk(&session, 1).await.unwrap(), Some(false));
        assert_eq!(probe_chunk(&session, 1).await.unwrap(), Some(false));
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_probes_share_one_fetch() {
        let fetcher = Arc::new(MemoryFetcher::new().with_body("/assets/1.js", BUNDLE));
        let session = Session {
            host: Arc::new(MemoryHost::new("/assets/", "").with_asset(1, "1.js")),
            fetcher: fetcher.clone(),
            worker_marker: "importScripts(".to_string(),
            state: LoadState::new(),
        };

        let probes = join_all((0..4).map(|_| probe_chunk(&session, 1))).await;

        for probe in probes {
            assert_eq!(probe.unwrap(), Some(false));
        }
        assert_eq!(fetcher.requests(), vec!["/assets/1.js"]);
    }

    #[tokio::test]
    async fn test_failed_probe_is_not_cached() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let session = Session {
            host: Arc::new(MemoryHost::new("/assets/", "").with_asset(1, "1.js")),
            fetcher: fetcher.clone(),
            worker_marker: "importScripts(".to_string(),
            state: LoadState::new(),
        };

        assert!(probe_chunk(&session, 1).await.is_err());
        assert!(probe_chunk(&session, 1).await.is_err());
        assert_eq!(fetcher.requests().len(), 2);
    }
}
