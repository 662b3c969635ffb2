//! Configuration schema definitions

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Loader behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Substring whose presence marks a chunk asset as a web worker
    #[serde(default = "default_worker_marker")]
    pub worker_marker: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            worker_marker: default_worker_marker(),
        }
    }
}

fn default_worker_marker() -> String {
    "importScripts(".to_string()
}

/// HTTP client settings for asset probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_user_agent() -> String {
    format!("chunksweep/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    30
}

/// Offline snapshot of a deployed app
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Snapshot JSON file
    #[serde(default = "default_snapshot_path")]
    pub path: PathBuf,

    /// Overrides the public path recorded in the snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_path: Option<String>,

    /// Directory ensured chunks are downloaded into
    #[serde(default = "default_mirror_dir")]
    pub mirror_dir: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: default_snapshot_path(),
            public_path: None,
            mirror_dir: default_mirror_dir(),
        }
    }
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("snapshot.json")
}

fn default_mirror_dir() -> PathBuf {
    PathBuf::from("mirror")
}
