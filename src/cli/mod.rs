//! Command-line interface for chunksweep
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `scan`: List lazy chunk groups found in a bundle file
//! - `universe`: List chunk ids known to an asset-path function
//! - `load`: Run the full loader against a snapshot

mod load;
mod scan;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

pub use load::LoadCommand;
pub use scan::{ScanCommand, UniverseCommand};

/// chunksweep - eagerly load every lazy chunk of a webpack app
#[derive(Parser, Debug)]
#[command(name = "chunksweep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to chunksweep.toml config file
    #[arg(short, long, global = true, default_value = "chunksweep.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the lazy chunk groups referenced by a bundle or factory source
    Scan(ScanCommand),

    /// List the chunk ids an asset-path function maps to files
    Universe(UniverseCommand),

    /// Load every lazy chunk of a snapshotted app, mirroring the chunks
    Load(LoadCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Scan(cmd) => cmd.execute(),
            Commands::Universe(cmd) => cmd.execute(),
            Commands::Load(cmd) => cmd.execute(&self.config).await,
        }
    }
}

/// Print the chunksweep banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "⚡".cyan(),
        "chunksweep".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
