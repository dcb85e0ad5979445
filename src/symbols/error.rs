//! Error types for symbol loading

use std::io;
use thiserror::Error;

/// Failure fetching or parsing an assembly or its symbols.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The source could not read the file
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        /// Requested url
        url: String,
        /// Underlying IO failure
        #[source]
        source: io::Error,
    },

    /// The binary itself does not exist
    #[error("Assembly not found: {0}")]
    NotFound(String),

    /// Symbol data could not be parsed
    #[error("Invalid symbols in {url}: {source}")]
    InvalidSymbols {
        /// Url of the symbol file
        url: String,
        /// Parse failure
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience result alias for loader operations
pub type LoaderResult<T> = std::result::Result<T, LoaderError>;
