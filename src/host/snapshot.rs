//! Snapshot-backed module host
//!
//! Replays a deployed app from a JSON snapshot of its webpack runtime (public
//! path, asset-path function, chunk asset map and the factory table at page
//! load). Ensuring a chunk downloads its asset into a mirror directory and
//! registers the module factories the chunk defines, so lazy chunks reached
//! only through other lazy chunks are discovered as well.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{FactoryListener, ListenerId, ModuleHost};
use crate::fetch::AssetFetcher;
use crate::loader::{ChunkId, ModuleId};

/// `{123:function(` / `,456:(e,t,n)=>` module keys inside a chunk's module map
static MODULE_KEY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[{,]"?(\d+)"?:(?:function\b|\(|[A-Za-z_$][\w$]*=>)"#).unwrap()
});

/// Serialized state of a webpack runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// `require.p`
    pub public_path: String,

    /// `String(require.u)`
    pub asset_path_source: String,

    /// `require.u(id)` for every known chunk
    #[serde(default)]
    pub assets: BTreeMap<ChunkId, String>,

    /// `String(require.m[id])` for every registered factory
    #[serde(default)]
    pub factories: BTreeMap<ModuleId, String>,
}

impl Snapshot {
    /// Read a snapshot from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))
    }
}

/// A chunk written to the mirror directory
#[derive(Debug, Clone, Serialize)]
pub struct MirroredChunk {
    pub file: String,
    pub size: usize,
    pub sha256: String,
}

/// Module host replaying a [`Snapshot`]
pub struct SnapshotHost {
    public_path: String,
    asset_path_source: String,
    assets: BTreeMap<ChunkId, String>,
    fetcher: Arc<dyn AssetFetcher>,
    mirror_dir: PathBuf,

    factories: RwLock<BTreeMap<ModuleId, String>>,
    listeners: Mutex<Vec<(ListenerId, FactoryListener)>>,
    next_listener: AtomicU64,
    /// One cell per chunk; every ensure of a chunk awaits the same execution
    installed: Mutex<HashMap<ChunkId, Arc<OnceCell<()>>>>,
    mirrored: Mutex<HashMap<ChunkId, MirroredChunk>>,
    required: Mutex<Vec<ModuleId>>,
}

impl SnapshotHost {
    /// Create a host from a snapshot, downloading chunks into `mirror_dir`
    pub fn new(snapshot: Snapshot, fetcher: Arc<dyn AssetFetcher>, mirror_dir: PathBuf) -> Self {
        Self {
            public_path: snapshot.public_path,
            asset_path_source: snapshot.asset_path_source,
            assets: snapshot.assets,
            fetcher,
            mirror_dir,
            factories: RwLock::new(snapshot.factories),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            installed: Mutex::new(HashMap::new()),
            mirrored: Mutex::new(HashMap::new()),
            required: Mutex::new(Vec::new()),
        }
    }

    /// Replace the public path recorded in the snapshot
    pub fn with_public_path(mut self, public_path: impl Into<String>) -> Self {
        self.public_path = public_path.into();
        self
    }

    /// Every required entrypoint, in call order
    pub fn required_modules(&self) -> Vec<ModuleId> {
        self.required.lock().clone()
    }

    /// Chunks downloaded so far
    pub fn mirrored_chunks(&self) -> BTreeMap<ChunkId, MirroredChunk> {
        self.mirrored
            .lock()
            .iter()
            .map(|(id, chunk)| (*id, chunk.clone()))
            .collect()
    }

    /// Write `manifest.json` describing every mirrored chunk
    pub fn write_manifest(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.mirror_dir).context("Failed to create mirror directory")?;

        let manifest_path = self.mirror_dir.join("manifest.json");
        let manifest_json = serde_json::to_string_pretty(&self.mirrored_chunks())?;
        fs::write(&manifest_path, manifest_json).context("Failed to write manifest.json")?;

        Ok(manifest_path)
    }

    fn register_factory(&self, id: ModuleId, source: &str) {
        {
            let mut factories = self.factories.write();
            if factories.contains_key(&id) {
                return;
            }
            factories.insert(id, source.to_string());
        }

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

    /// Download a chunk into the mirror and register the factories it defines
    async fn install_chunk(&self, id: ChunkId, asset: &str) -> Result<()> {
        let target = self.mirror_dir.join(mirror_relative_path(asset)?);
        let url = format!("{}{}", self.public_path, asset);

        let body = self.fetcher.fetch_text(&url).await?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&target, &body)
            .await
            .with_context(|| format!("Failed to write chunk: {}", target.display()))?;

        self.mirrored.lock().insert(
            id,
            MirroredChunk {
                file: asset.to_string(),
                size: body.len(),
                sha256: hex::encode(Sha256::digest(body.as_bytes())),
            },
        );
        info!("Mirrored chunk {} ({} bytes)", id, body.len());

        for (module, source) in split_chunk_modules(&body) {
            self.register_factory(module, source);
        }

        Ok(())
    }
}

#[async_trait]
impl ModuleHost for SnapshotHost {
    fn require(&self, id: ModuleId) -> Result<()> {
        if !self.has_factory(id) {
            bail!("Cannot find module '{}'", id);
        }
        self.required.lock().push(id);
        Ok(())
    }

    async fn ensure_chunk(&self, id: ChunkId) -> Result<()> {
        // Chunks without a script asset have nothing to execute
        let Some(asset) = self.assets.get(&id).filter(|asset| asset.as_str() != "undefined.js") else {
            debug!("Chunk {} has no script asset, nothing to execute", id);
            return Ok(());
        };

        let cell = self.installed.lock().entry(id).or_default().clone();
        cell.get_or_try_init(|| self.install_chunk(id, asset)).await?;

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

/// Split a chunk body into `(module id, factory source)` pairs.
///
/// Each factory runs from its key to the next key, which over-approximates the
/// factory text; good enough for pattern scanning.
pub fn split_chunk_modules(body: &str) -> Vec<(ModuleId, &str)> {
    let keys: Vec<(ModuleId, usize)> = MODULE_KEY_REGEX
        .captures_iter(body)
        .filter_map(|cap| {
            let id = cap[1].parse().ok()?;
            Some((id, cap.get(0)?.start() + 1))
        })
        .collect();

    keys.iter()
        .enumerate()
        .map(|(i, &(id, start))| {
            let end = keys.get(i + 1).map(|&(_, next)| next - 1).unwrap_or(body.len());
            (id, &body[start..end])
        })
        .collect()
}

/// Map an asset path onto a path inside the mirror directory
fn mirror_relative_path(asset: &str) -> Result<PathBuf> {
    let path = Path::new(asset.split(['?', '#']).next().unwrap_or(asset));
    let mut relative = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::RootDir | Component::CurDir => {}
            _ => bail!("Refusing to mirror asset outside the mirror directory: {}", asset),
        }
    }

    if relative.as_os_str().is_empty() {
        bail!("Empty asset path");
    }
    debug!("Mirroring {} as {}", asset, relative.display());
    Ok(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use crate::fetch::MemoryFetcher;
    use crate::loader::LazyChunkLoader;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_chunk_modules() {
        let body = r#"(this.webpackChunkapp=this.webpackChunkapp||[]).push([[12],{123:function(e,t,n){n.e("7").then(n.bind(n,"9"))},456:(e,t)=>{t.x=1},789:e=>{}}]);"#;

        let modules = split_chunk_modules(body);
        let ids: Vec<ModuleId> = modules.iter().map(|(id, _)| *id).collect();

        assert_eq!(ids, vec![123, 456, 789]);
        assert!(modules[0].1.starts_with("123:function"));
        assert!(modules[0].1.contains(r#"n.bind(n,"9")"#));
        assert!(modules[1].1.starts_with("456:"));
    }

    #[test]
    fn test_mirror_relative_path() {
        assert_eq!(mirror_relative_path("abc.js").unwrap(), PathBuf::from("abc.js"));
        assert_eq!(
            mirror_relative_path("/assets/abc.js?v=2").unwrap(),
            PathBuf::from("assets/abc.js")
        );
        assert!(mirror_relative_path("../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_ensure_mirrors_and_registers_factories() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot {
            public_path: "https://cdn.test/".to_string(),
            asset_path_source: String::new(),
            assets: BTreeMap::from([(12, "12.abc.js".to_string())]),
            factories: BTreeMap::new(),
        };
        let fetcher = Arc::new(MemoryFetcher::new().with_body(
            "https://cdn.test/12.abc.js",
            r#"push([[12],{55:function(e){}}])"#,
        ));
        let host = SnapshotHost::new(snapshot, fetcher.clone(), dir.path().to_path_buf());

        host.ensure_chunk(12).await.unwrap();
        host.ensure_chunk(12).await.unwrap();

        assert!(host.has_factory(55));
        assert!(dir.path().join("12.abc.js").exists());
        assert_eq!(fetcher.requests().len(), 1);

        let manifest = host.write_manifest().unwrap();
        let content = fs::read_to_string(manifest).unwrap();
        assert!(content.contains("12.abc.js"));
    }

    #[tokio::test]
    async fn test_concurrent_ensures_share_one_download() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot {
            public_path: "https://cdn.test/".to_string(),
            assets: BTreeMap::from([(1, "1.js".to_string())]),
            ..Default::default()
        };
        let fetcher = Arc::new(
            MemoryFetcher::new().with_body("https://cdn.test/1.js", r#"push([[1],{9:function(e){}}])"#),
        );
        let host = SnapshotHost::new(snapshot, fetcher.clone(), dir.path().to_path_buf());

        let (first, second) = tokio::join!(host.ensure_chunk(1), host.ensure_chunk(1));
        first.unwrap();
        second.unwrap();

        // Both callers resolve only after the chunk's factories are registered
        assert!(host.has_factory(9));
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_chunk_without_script_asset_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot {
            public_path: "https://cdn.test/".to_string(),
            assets: BTreeMap::from([(2, "undefined.js".to_string())]),
            ..Default::default()
        };
        let fetcher = Arc::new(MemoryFetcher::new());
        let host = SnapshotHost::new(snapshot, fetcher.clone(), dir.path().to_path_buf());

        host.ensure_chunk(2).await.unwrap();
        host.ensure_chunk(3).await.unwrap();

        assert!(fetcher.requests().is_empty());
        assert!(host.mirrored_chunks().is_empty());
    }

    #[tokio::test]
    async fn test_group_with_assetless_chunk_still_requires_entrypoint() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot {
            public_path: "https://cdn.test/".to_string(),
            asset_path_source: r#"e=>({1:"a",2:"b"})[e]+".js""#.to_string(),
            assets: BTreeMap::from([(1, "1.js".to_string()), (2, "undefined.js".to_string())]),
            factories: BTreeMap::from([
                (5, r#"function(e,t,n){Promise.all([n.e("1"),n.e("2")]).then(n.bind(n,"9"))}"#.to_string()),
                (9, "function(){}".to_string()),
            ]),
        };
        let fetcher = Arc::new(MemoryFetcher::new().with_body("https://cdn.test/1.js", "push([[1],{}])"));
        let host = Arc::new(SnapshotHost::new(snapshot, fetcher.clone(), dir.path().to_path_buf()));

        let report = LazyChunkLoader::new(host.clone(), fetcher, LoaderConfig::default())
            .load_lazy_chunks()
            .await
            .unwrap();

        assert_eq!(report.groups_failed, 0);
        assert_eq!(report.groups_loaded, 1);
        assert_eq!(host.required_modules(), vec![9]);
    }
}
