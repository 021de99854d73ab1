//! Validated crawl configuration.
//!
//! [`CrawlConfig`] is built by the binary from command-line arguments (or by
//! tests directly) and checked once with [`CrawlConfig::validate`] before any
//! network traffic happens.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::fetch::{RetryPolicy, Service};

/// Maximum allowed BFS depth.
pub const MAX_DEPTH: u32 = 10;

/// Minimum allowed worker-pool width.
pub const MIN_WORKERS: usize = 1;

/// Maximum allowed worker-pool width.
pub const MAX_WORKERS: usize = 100;

/// Default worker-pool width.
pub const DEFAULT_WORKERS: usize = 8;

/// Default title similarity floor for accepting a title-search hit.
pub const DEFAULT_MIN_TITLE_SIMILARITY: f64 = 0.75;

/// Maximum retries accepted for a single service.
const MAX_SERVICE_RETRIES: u32 = 10;

/// Where reference lists come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSelection {
    /// Reference lists from the primary catalog only.
    #[default]
    PrimaryOnly,
    /// Reference lists from the secondary service, mapped onto the catalog.
    SecondaryOnly,
    /// Both lists merged and deduplicated before mapping.
    Both,
    /// Secondary when the seed has few primary references, else primary.
    Auto,
}

/// Key used to merge overlapping reference lists in [`SourceSelection::Both`] mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupKeyPolicy {
    /// Lowercase DOI, falling back to the normalized title.
    #[default]
    DoiFirst,
    /// Normalized title, falling back to the lowercase DOI.
    TitleFirst,
}

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Seed input was empty.
    #[error("seed must not be empty")]
    EmptySeed,

    /// Depth bound outside `0..=MAX_DEPTH`.
    #[error("max depth {0} exceeds the limit of {MAX_DEPTH}")]
    DepthTooLarge(u32),

    /// Worker width outside `MIN_WORKERS..=MAX_WORKERS`.
    #[error("worker count {0} must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkers(usize),

    /// A per-service setting is out of range.
    #[error("invalid {service} setting: {reason}")]
    InvalidService {
        /// The service whose setting is wrong.
        service: Service,
        /// What is wrong with it.
        reason: String,
    },

    /// Similarity floor outside `0..=1`.
    #[error("title similarity {0} must be between 0 and 1")]
    InvalidSimilarity(f64),

    /// Global timeout of zero.
    #[error("global timeout must be greater than zero")]
    ZeroGlobalTimeout,
}

impl ConfigError {
    fn service(service: Service, reason: impl Into<String>) -> Self {
        Self::InvalidService {
            service,
            reason: reason.into(),
        }
    }
}

/// Per-service transport settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Sustained requests per second.
    pub qps: f64,
    /// Token-bucket capacity.
    pub burst: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Back-off base delay.
    pub backoff_base: Duration,
    /// Back-off cap (before jitter).
    pub backoff_cap: Duration,
    /// Upper bound of the uniform jitter.
    pub max_jitter: Duration,
}

impl ServiceConfig {
    /// Polite defaults for the primary catalog.
    #[must_use]
    pub fn openalex_default() -> Self {
        Self {
            qps: 3.0,
            burst: 3,
            timeout: Duration::from_secs(30),
            max_retries: 4,
            backoff_base: Duration::from_millis(1500),
            backoff_cap: Duration::from_secs(30),
            max_jitter: Duration::from_millis(500),
        }
    }

    /// Defaults for the secondary service (unauthenticated pool).
    #[must_use]
    pub fn semantic_scholar_default() -> Self {
        Self {
            qps: 1.0,
            burst: 1,
            max_retries: 3,
            ..Self::openalex_default()
        }
    }

    /// Default settings for `service`.
    #[must_use]
    pub fn default_for(service: Service) -> Self {
        match service {
            Service::OpenAlex => Self::openalex_default(),
            Service::SemanticScholar => Self::semantic_scholar_default(),
        }
    }

    /// The retry policy these settings describe.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            self.backoff_base,
            self.backoff_cap,
            self.max_jitter,
        )
    }

    fn validate(&self, service: Service) -> Result<(), ConfigError> {
        if !self.qps.is_finite() || self.qps <= 0.0 {
            return Err(ConfigError::service(
                service,
                format!("qps must be positive (got {})", self.qps),
            ));
        }
        if self.burst == 0 {
            return Err(ConfigError::service(service, "burst must be at least 1"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::service(service, "timeout must be greater than zero"));
        }
        if self.max_retries > MAX_SERVICE_RETRIES {
            return Err(ConfigError::service(
                service,
                format!(
                    "max retries {} exceeds the limit of {MAX_SERVICE_RETRIES}",
                    self.max_retries
                ),
            ));
        }
        Ok(())
    }
}

/// Complete configuration for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Seed input: catalog id, DOI, secondary id, URL, or title text.
    pub seed: String,
    /// Depth bound (the seed is depth 0).
    pub max_depth: u32,
    /// Reference-list source selection.
    pub sources: SourceSelection,
    /// Citation-count threshold; `0` disables pruning.
    pub min_citations: u64,
    /// Drop references whose origin-reported count is below the threshold.
    pub pre_prune: bool,
    /// Compare the canonical count after mapping.
    pub post_prune: bool,
    /// Remove below-threshold nodes entirely instead of keeping them unexpanded.
    pub aggressive_prune: bool,
    /// Drop references whose citation count is unknown.
    pub strict_threshold: bool,
    /// Keep unmappable references as synthetic nodes.
    pub keep_unmapped: bool,
    /// Worker-pool width.
    pub workers: usize,
    /// Primary catalog transport settings.
    pub openalex: ServiceConfig,
    /// Secondary service transport settings.
    pub semantic_scholar: ServiceConfig,
    /// Contact address for polite request headers.
    pub contact_email: Option<String>,
    /// Merge key for overlapping reference lists.
    pub dedup_key: DedupKeyPolicy,
    /// Similarity floor for title-search hits.
    pub min_title_similarity: f64,
    /// Wall-clock budget for the whole crawl.
    pub global_timeout: Option<Duration>,
    /// Directory receiving the graph (and metrics) documents.
    pub output_dir: PathBuf,
    /// Also write `metrics.json`.
    pub write_metrics: bool,
    /// Show per-layer progress bars.
    pub progress: bool,
    /// Override of the catalog API base URL.
    pub openalex_url: Option<String>,
    /// Override of the reference service API base URL.
    pub semantic_scholar_url: Option<String>,
    /// Identity cache file carried across runs.
    pub map_cache_path: Option<PathBuf>,
}

impl CrawlConfig {
    /// Configuration with defaults for everything but the seed.
    #[must_use]
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            max_depth: 1,
            sources: SourceSelection::default(),
            min_citations: 0,
            pre_prune: true,
            post_prune: true,
            aggressive_prune: false,
            strict_threshold: false,
            keep_unmapped: false,
            workers: DEFAULT_WORKERS,
            openalex: ServiceConfig::openalex_default(),
            semantic_scholar: ServiceConfig::semantic_scholar_default(),
            contact_email: None,
            dedup_key: DedupKeyPolicy::default(),
            min_title_similarity: DEFAULT_MIN_TITLE_SIMILARITY,
            global_timeout: None,
            output_dir: PathBuf::from("."),
            write_metrics: false,
            progress: false,
            openalex_url: None,
            semantic_scholar_url: None,
            map_cache_path: None,
        }
    }

    /// Settings for `service`.
    #[must_use]
    pub fn service(&self, service: Service) -> &ServiceConfig {
        match service {
            Service::OpenAlex => &self.openalex,
            Service::SemanticScholar => &self.semantic_scholar,
        }
    }

    /// Checks every value range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seed.trim().is_empty() {
            return Err(ConfigError::EmptySeed);
        }
        if self.max_depth > MAX_DEPTH {
            return Err(ConfigError::DepthTooLarge(self.max_depth));
        }
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.workers) {
            return Err(ConfigError::InvalidWorkers(self.workers));
        }
        self.openalex.validate(Service::OpenAlex)?;
        self.semantic_scholar.validate(Service::SemanticScholar)?;
        if !(0.0..=1.0).contains(&self.min_title_similarity) {
            return Err(ConfigError::InvalidSimilarity(self.min_title_similarity));
        }
        if self.global_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroGlobalTimeout);
        }
        Ok(())
    }
}
