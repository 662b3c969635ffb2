//! Error types for the lazy chunk loader.

use thiserror::Error;

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Main error type for the lazy chunk loader.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// The asset-path function yielded no chunk ids at all
    #[error("Failed to get all chunks: the asset-path function source contains no chunk ids")]
    EmptyChunkUniverse,

    /// Fetching a chunk asset failed
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// A host operation failed
    #[error("Host error: {0}")]
    Host(String),
}

impl From<anyhow::Error> for LoaderError {
    fn from(err: anyhow::Error) -> Self {
        LoaderError::Host(format!("{:#}", err))
    }
}
