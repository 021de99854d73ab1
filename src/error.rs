//! Run-level errors.
//!
//! Everything here is fatal: the run stops and the binary exits non-zero.
//! Per-request failures never reach this type; they are absorbed by the
//! crawler as misses or failed tasks.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::fetch::FetchError;

/// Fatal crawl errors.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Configuration values out of range.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// HTTP clients could not be constructed.
    #[error("failed to set up HTTP clients: {0}")]
    Client(#[from] FetchError),

    /// The seed did not resolve to a catalog work.
    #[error("seed {seed:?} could not be resolved: {reason}")]
    SeedUnresolved {
        /// The seed input.
        seed: String,
        /// Why resolution failed.
        reason: String,
    },

    /// Secondary-only expansion was requested but the seed is unknown there.
    #[error("seed {seed:?} was not found in the reference service; try --sources primary or both")]
    SecondarySeedMissing {
        /// The seed input.
        seed: String,
    },

    /// Writing an output file failed.
    #[error("failed to write {}: {source}", path.display())]
    Export {
        /// The file being written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Serializing an output document failed.
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        /// Which document.
        what: &'static str,
        /// The underlying serializer error.
        #[source]
        source: serde_json::Error,
    },
}

impl CrawlError {
    /// Creates a seed resolution error.
    pub fn seed_unresolved(seed: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SeedUnresolved {
            seed: seed.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error happened after crawl work was complete.
    #[must_use]
    pub fn is_export_failure(&self) -> bool {
        matches!(self, Self::Export { .. } | Self::Serialize { .. })
    }
}
