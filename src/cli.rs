//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use citegraph_core::config::DEFAULT_WORKERS;
use citegraph_core::{CrawlConfig, DedupKeyPolicy, MAX_DEPTH, ServiceConfig, SourceSelection};

/// Build a citation graph by tracing a paper's references layer by layer.
///
/// The seed may be an OpenAlex work id or URL, a DOI, a Semantic Scholar
/// paper id or URL, or a title.
#[derive(Parser, Debug)]
#[command(name = "citegraph")]
#[command(author, version, about)]
pub struct Args {
    /// Seed publication (id, DOI, URL, or title)
    pub seed: String,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum BFS depth (the seed is depth 0)
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_DEPTH)))]
    pub depth: u32,

    /// Where reference lists come from
    #[arg(short, long, value_enum, default_value_t = SourcesArg::Primary)]
    pub sources: SourcesArg,

    /// Citation-count threshold (0 disables pruning)
    #[arg(short = 'm', long, default_value_t = 0)]
    pub min_citations: u64,

    /// Remove below-threshold works instead of keeping them unexpanded
    #[arg(long)]
    pub aggressive_prune: bool,

    /// Skip pruning on citation counts reported by the reference source
    #[arg(long)]
    pub no_pre_prune: bool,

    /// Skip pruning on canonical citation counts
    #[arg(long)]
    pub no_post_prune: bool,

    /// Drop works whose citation count is unknown
    #[arg(long)]
    pub strict_threshold: bool,

    /// Keep references that cannot be mapped to the catalog
    #[arg(long)]
    pub keep_unmapped: bool,

    /// Concurrent workers (1-100)
    #[arg(short = 'w', long, default_value_t = DEFAULT_WORKERS as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub workers: u8,

    /// Key used to merge overlapping reference lists
    #[arg(long, value_enum, default_value_t = DedupKeyArg::Doi)]
    pub dedup_key: DedupKeyArg,

    /// Similarity floor for accepting a title-search hit (0-1)
    #[arg(long, default_value_t = citegraph_core::config::DEFAULT_MIN_TITLE_SIMILARITY)]
    pub min_title_similarity: f64,

    /// Contact address for polite API access
    #[arg(short, long, env = "OPENALEX_EMAIL")]
    pub email: Option<String>,

    /// Global time budget in seconds; the graph is still written when it runs out
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Also write metrics.json
    #[arg(long)]
    pub metrics: bool,

    /// Reuse and update identity lookups stored in this file across runs
    #[arg(long, value_name = "PATH")]
    pub map_cache: Option<PathBuf>,

    /// Show per-layer progress bars
    #[arg(long)]
    pub progress: bool,

    /// OpenAlex requests per second
    #[arg(long)]
    pub openalex_qps: Option<f64>,

    /// OpenAlex burst capacity
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub openalex_burst: Option<u32>,

    /// OpenAlex per-request timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=600))]
    pub openalex_timeout: Option<u64>,

    /// OpenAlex retries for transient failures (0-10)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub openalex_retries: Option<u32>,

    /// OpenAlex back-off base in milliseconds
    #[arg(long)]
    pub openalex_backoff_ms: Option<u64>,

    /// OpenAlex maximum jitter in milliseconds
    #[arg(long)]
    pub openalex_jitter_ms: Option<u64>,

    /// Semantic Scholar requests per second
    #[arg(long)]
    pub s2_qps: Option<f64>,

    /// Semantic Scholar burst capacity
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub s2_burst: Option<u32>,

    /// Semantic Scholar per-request timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=600))]
    pub s2_timeout: Option<u64>,

    /// Semantic Scholar retries for transient failures (0-10)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub s2_retries: Option<u32>,

    /// Semantic Scholar back-off base in milliseconds
    #[arg(long)]
    pub s2_backoff_ms: Option<u64>,

    /// Semantic Scholar maximum jitter in milliseconds
    #[arg(long)]
    pub s2_jitter_ms: Option<u64>,

    /// OpenAlex API base URL
    #[arg(long, env = "CITEGRAPH_OPENALEX_URL", hide = true)]
    pub openalex_url: Option<String>,

    /// Semantic Scholar API base URL
    #[arg(long, env = "CITEGRAPH_S2_URL", hide = true)]
    pub s2_url: Option<String>,
}

/// `--sources` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourcesArg {
    /// OpenAlex reference lists
    Primary,
    /// Semantic Scholar reference lists, mapped onto OpenAlex
    Secondary,
    /// Both, merged before mapping
    Both,
    /// Semantic Scholar when OpenAlex lists fewer than 10 references
    Auto,
}

impl From<SourcesArg> for SourceSelection {
    fn from(arg: SourcesArg) -> Self {
        match arg {
            SourcesArg::Primary => Self::PrimaryOnly,
            SourcesArg::Secondary => Self::SecondaryOnly,
            SourcesArg::Both => Self::Both,
            SourcesArg::Auto => Self::Auto,
        }
    }
}

/// `--dedup-key` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DedupKeyArg {
    /// DOI first, then title
    Doi,
    /// Title first, then DOI
    Title,
}

impl From<DedupKeyArg> for DedupKeyPolicy {
    fn from(arg: DedupKeyArg) -> Self {
        match arg {
            DedupKeyArg::Doi => Self::DoiFirst,
            DedupKeyArg::Title => Self::TitleFirst,
        }
    }
}

/// Per-service overrides as given on the command line.
struct ServiceOverrides {
    qps: Option<f64>,
    burst: Option<u32>,
    timeout: Option<u64>,
    retries: Option<u32>,
    backoff_ms: Option<u64>,
    jitter_ms: Option<u64>,
}

impl ServiceOverrides {
    fn apply(self, mut base: ServiceConfig) -> ServiceConfig {
        if let Some(qps) = self.qps {
            base.qps = qps;
        }
        if let Some(burst) = self.burst {
            base.burst = burst;
        }
        if let Some(secs) = self.timeout {
            base.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = self.retries {
            base.max_retries = retries;
        }
        if let Some(ms) = self.backoff_ms {
            base.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = self.jitter_ms {
            base.max_jitter = Duration::from_millis(ms);
        }
        base
    }
}

impl Args {
    /// The crawl configuration these arguments describe (not yet validated).
    #[must_use]
    pub fn to_config(&self) -> CrawlConfig {
        let mut config = CrawlConfig::new(self.seed.clone());
        config.max_depth = self.depth;
        config.sources = self.sources.into();
        config.min_citations = self.min_citations;
        config.pre_prune = !self.no_pre_prune;
        config.post_prune = !self.no_post_prune;
        config.aggressive_prune = self.aggressive_prune;
        config.strict_threshold = self.strict_threshold;
        config.keep_unmapped = self.keep_unmapped;
        config.workers = usize::from(self.workers);
        config.dedup_key = self.dedup_key.into();
        config.min_title_similarity = self.min_title_similarity;
        config.contact_email = self.email.clone().filter(|e| !e.trim().is_empty());
        config.global_timeout = self.timeout.map(Duration::from_secs);
        config.output_dir = self.output.clone();
        config.write_metrics = self.metrics;
        config.map_cache_path = self.map_cache.clone();
        config.progress = self.progress && !self.quiet;
        config.openalex = ServiceOverrides {
            qps: self.openalex_qps,
            burst: self.openalex_burst,
            timeout: self.openalex_timeout,
            retries: self.openalex_retries,
            backoff_ms: self.openalex_backoff_ms,
            jitter_ms: self.openalex_jitter_ms,
        }
        .apply(ServiceConfig::openalex_default());
        config.semantic_scholar = ServiceOverrides {
            qps: self.s2_qps,
            burst: self.s2_burst,
            timeout: self.s2_timeout,
            retries: self.s2_retries,
            backoff_ms: self.s2_backoff_ms,
            jitter_ms: self.s2_jitter_ms,
        }
        .apply(ServiceConfig::semantic_scholar_default());
        config.openalex_url = self.openalex_url.clone();
        config.semantic_scholar_url = self.s2_url.clone();
        config
    }
}
