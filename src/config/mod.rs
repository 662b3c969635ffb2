//! Configuration handling for chunksweep
//!
//! Parses and manages chunksweep.toml configuration files.

mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use schema::*;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Loader behaviour
    #[serde(default)]
    pub loader: LoaderConfig,

    /// HTTP client settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Snapshot host settings
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// A missing file yields the defaults, rooted at the current directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let mut config = if canonical_path.exists() {
            let content = fs::read_to_string(&canonical_path).with_context(|| {
                format!("Failed to read config file: {}", canonical_path.display())
            })?;
            Self::parse(&content)?
        } else {
            debug!("No config at {}, using defaults", canonical_path.display());
            Config::default()
        };

        config.root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse chunksweep.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.loader.worker_marker.is_empty() {
            anyhow::bail!("loader.worker_marker must not be empty");
        }

        if self.fetch.timeout_secs == 0 || self.fetch.connect_timeout_secs == 0 {
            anyhow::bail!("fetch timeouts must be greater than zero");
        }

        Ok(())
    }

    /// Absolute path of the snapshot file
    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(&self.snapshot.path)
    }

    /// Absolute path of the mirror directory
    pub fn mirror_dir(&self) -> PathBuf {
        self.root.join(&self.snapshot.mirror_dir)
    }
}
