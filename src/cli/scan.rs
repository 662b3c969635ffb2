//! Offline scanning commands

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::loader::{extract_chunk_groups, parse_chunk_universe};

/// List the lazy chunk groups referenced by a source file
#[derive(Args, Debug)]
pub struct ScanCommand {
    /// JavaScript file to scan (a bundle, chunk or single factory)
    pub file: PathBuf,

    /// Print groups as JSON
    #[arg(long)]
    pub json: bool,
}

impl ScanCommand {
    pub fn execute(&self) -> Result<()> {
        let source = fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read {}", self.file.display()))?;

        let groups = extract_chunk_groups(&source);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&groups)?);
            return Ok(());
        }

        eprintln!(
            "{} Found {} lazy chunk group(s) in {}\n",
            "✓".green().bold(),
            groups.len(),
            self.file.display().to_string().cyan()
        );

        for group in &groups {
            let chunks: Vec<String> = group.chunk_ids.iter().map(|id| id.to_string()).collect();
            println!("{} -> {}", chunks.join(","), group.entry_point);
        }

        Ok(())
    }
}

/// List the chunk ids an asset-path function maps to files
#[derive(Args, Debug)]
pub struct UniverseCommand {
    /// File holding the source text of the asset-path function
    pub file: PathBuf,
}

impl UniverseCommand {
    pub fn execute(&self) -> Result<()> {
        let source = fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read {}", self.file.display()))?;

        let ids = parse_chunk_universe(&source);
        if ids.is_empty() {
            anyhow::bail!("No chunk ids found in {}", self.file.display());
        }

        eprintln!("{} {} known chunk(s)\n", "✓".green().bold(), ids.len());
        for id in ids {
            println!("{}", id);
        }

        Ok(())
    }
}
