//! chunksweep library
//!
//! Eagerly loads every lazy chunk of a webpack-bundled web client by scanning
//! module factories for lazy-load call sites and driving the bundler runtime.

pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod host;
pub mod loader;
pub mod utils;

pub use cli::Cli;
pub use config::Config;
pub use error::{LoaderError, Result};
pub use loader::{load_lazy_chunks, LazyChunkLoader, LoadReport};
