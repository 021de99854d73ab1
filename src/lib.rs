//! Citegraph Core Library
//!
//! Builds a directed citation graph by tracing a seed publication's
//! references layer by layer against two bibliographic services: OpenAlex
//! (the canonical catalog) and Semantic Scholar (an independent source of
//! reference lists).
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - Rate-limited, retrying HTTP transport shared by both services
//! - [`sources`] - The [`Catalog`] and [`ReferenceSource`] seams and their HTTP clients
//! - [`identity`] - Reference normalization, the identity cache, cross-source mapping
//! - [`prune`] - Citation-count pruning policy
//! - [`graph`] - The deduplicating node/edge accumulator
//! - [`crawl`] - The layered breadth-first orchestrator
//! - [`metrics`] - Per-service call statistics and per-layer timings
//! - [`export`] - Graph and metrics documents

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod crawl;
pub mod error;
pub mod export;
pub mod fetch;
pub mod graph;
pub mod identity;
pub mod metrics;
pub mod prune;
pub mod sources;
mod user_agent;

// Re-export commonly used types
pub use config::{
    ConfigError, CrawlConfig, DedupKeyPolicy, MAX_DEPTH, MAX_WORKERS, MIN_WORKERS, ServiceConfig,
    SourceSelection,
};
pub use crawl::{CrawlOutcome, CrawlState, Crawler, Expansion};
pub use error::CrawlError;
pub use fetch::{FailureType, FetchClient, FetchError, RateLimiter, RetryDecision, RetryPolicy, Service};
pub use graph::{Citation, CitationGraph, GraphSnapshot, Origin, Work};
pub use identity::{CrossSourceMapper, IdentityCache};
pub use metrics::{LayerMetrics, MetricsCollector, MetricsReport};
pub use prune::{PostDecision, PrunePolicy};
pub use sources::{
    Catalog, CatalogWork, OpenAlexCatalog, PaperLookup, RawReference, ReferenceSource, SecondaryPaper,
    SemanticScholarSource,
};
