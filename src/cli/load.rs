//! Load command implementation

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::info;

use crate::config::Config;
use crate::fetch::HttpFetcher;
use crate::host::{ModuleHost, Snapshot, SnapshotHost};
use crate::loader::LazyChunkLoader;
use crate::utils::{format_chunk_ids, format_duration};

/// Load every lazy chunk of a snapshotted app
#[derive(Args, Debug)]
pub struct LoadCommand {
    /// Snapshot JSON file (overrides snapshot.path)
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,

    /// Directory to mirror chunks into (overrides snapshot.mirror_dir)
    #[arg(short, long)]
    pub mirror: Option<PathBuf>,

    /// Public path prefix for chunk assets (overrides the snapshot's)
    #[arg(long)]
    pub public_path: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl LoadCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        info!("Loading configuration from {}", config_path);
        let config = Config::load(config_path)?;

        let snapshot_path = self.snapshot.clone().unwrap_or_else(|| config.snapshot_path());
        let mirror_dir = self.mirror.clone().unwrap_or_else(|| config.mirror_dir());

        eprintln!(
            "{} Loading lazy chunks from {}...",
            "→".blue(),
            snapshot_path.display().to_string().cyan()
        );

        let snapshot = Snapshot::load(&snapshot_path)?;
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);

        let mut host = SnapshotHost::new(snapshot, fetcher.clone(), mirror_dir);
        if let Some(public_path) = self
            .public_path
            .clone()
            .or_else(|| config.snapshot.public_path.clone())
        {
            host = host.with_public_path(public_path);
        }
        let public_path = host.public_path();
        url::Url::parse(&public_path)
            .with_context(|| format!("Public path is not an absolute URL: {}", public_path))?;
        let host = Arc::new(host);

        let loader = LazyChunkLoader::new(host.clone(), fetcher, config.loader.clone());
        let Some(report) = loader.load_lazy_chunks().await else {
            anyhow::bail!("Loading lazy chunks failed, see the log above");
        };

        let manifest = host.write_manifest()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        eprintln!(
            "\n{} Loaded {} chunk group(s) in {}\n",
            "✓".green().bold(),
            report.groups_loaded,
            format_duration(report.elapsed)
        );

        let rows = [
            ("factories scanned", report.factories_scanned.to_string()),
            ("groups discarded", report.groups_discarded.to_string()),
            ("groups failed", report.groups_failed.to_string()),
            ("entrypoints required", report.entrypoints_required.to_string()),
            ("valid chunks", format_chunk_ids(&report.valid_chunks)),
            ("invalid chunks", format_chunk_ids(&report.invalid_chunks)),
            ("residual loaded", format_chunk_ids(&report.residual.loaded)),
            ("residual workers", format_chunk_ids(&report.residual.workers)),
            ("residual failed", format_chunk_ids(&report.residual.failed)),
        ];
        for (label, value) in rows {
            eprintln!("  {} {:<22} {}", "•".dimmed(), label, value.cyan());
        }

        eprintln!(
            "\n  {} {} chunk(s) mirrored, manifest at {}\n",
            "•".dimmed(),
            host.mirrored_chunks().len(),
            manifest.display().to_string().cyan()
        );

        Ok(())
    }
}
