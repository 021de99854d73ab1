//! Layered breadth-first crawl.
//!
//! # Overview
//!
//! A run moves through
//! `Seeding → LayerActive(k) → LayerComplete(k) → … → Done`, or ends in
//! `Failed` when the seed cannot be resolved. Each layer runs in two phases,
//! both bounded by one worker semaphore:
//!
//! 1. one task per frontier item fetches and normalizes its reference list
//! 2. one task per surviving reference pre-prunes, maps, post-prunes, and
//!    commits the node and edge
//!
//! Every task of layer `k` terminates before any task of layer `k + 1` is
//! spawned. A node joins the next frontier only from the task whose commit
//! created it, so no work is expanded twice.
//!
//! # Example
//!
//! ```no_run
//! use citegraph_core::{CrawlConfig, Crawler};
//!
//! # async fn example() -> Result<(), citegraph_core::CrawlError> {
//! let mut config = CrawlConfig::new("10.1103/PhysRevLett.116.061102");
//! config.max_depth = 2;
//! let crawler = Crawler::from_config(config)?;
//! let outcome = crawler.run().await?;
//! println!("{} nodes", outcome.graph.nodes.len());
//! # Ok(())
//! # }
//! ```

mod progress;
mod tasks;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::{CrawlConfig, DedupKeyPolicy, SourceSelection};
use crate::error::CrawlError;
use crate::fetch::{FetchClient, Service};
use crate::graph::{CitationGraph, GraphSnapshot, NodeCommit, Origin, Work};
use crate::identity::{CrossSourceMapper, IdentityCache, NormalizedReference, merge_references, normalize};
use crate::metrics::{LayerMetrics, MetricsCollector};
use crate::prune::{PostDecision, PrunePolicy};
use crate::sources::seed::SeedInput;
use crate::sources::{
    Catalog, CatalogWork, OpenAlexCatalog, PaperLookup, RawReference, ReferenceSource, SemanticScholarSource,
};
use progress::layer_bar;
use tasks::{DeadlineExpired, LayerTasks};

/// Below this many catalog references, `Auto` switches to the reference service.
pub const AUTO_MIN_PRIMARY_REFS: usize = 10;

/// Position of a run in the crawl state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Seeding,
    LayerActive(u32),
    LayerComplete(u32),
    Done,
    Failed,
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seeding => write!(f, "seeding"),
            Self::LayerActive(k) => write!(f, "layer {k} active"),
            Self::LayerComplete(k) => write!(f, "layer {k} complete"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Which reference lists a layer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expansion {
    pub primary: bool,
    pub secondary: bool,
}

impl Expansion {
    pub const PRIMARY: Self = Self {
        primary: true,
        secondary: false,
    };
    pub const SECONDARY: Self = Self {
        primary: false,
        secondary: true,
    };
    pub const BOTH: Self = Self {
        primary: true,
        secondary: true,
    };

    /// Resolves a selection against the seed's catalog reference count.
    #[must_use]
    pub fn from_selection(selection: SourceSelection, seed_primary_refs: usize) -> Self {
        match selection {
            SourceSelection::PrimaryOnly => Self::PRIMARY,
            SourceSelection::SecondaryOnly => Self::SECONDARY,
            SourceSelection::Both => Self::BOTH,
            SourceSelection::Auto if seed_primary_refs < AUTO_MIN_PRIMARY_REFS => Self::SECONDARY,
            SourceSelection::Auto => Self::PRIMARY,
        }
    }
}

/// Result of a finished (possibly cancelled) run.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// The seed string as given.
    pub seed_input: String,
    /// Canonical id of the resolved seed.
    pub seed_key: String,
    pub max_depth: u32,
    /// Layers whose barrier was crossed.
    pub layers_completed: u32,
    /// False when the global timeout cancelled the run.
    pub complete: bool,
    /// Why the run stopped early, if it did.
    pub failure: Option<String>,
    pub final_state: CrawlState,
    /// Everything committed before the run ended.
    pub graph: GraphSnapshot,
}

/// A node waiting to be expanded.
#[derive(Debug, Clone)]
struct FrontierItem {
    key: String,
    /// Paper id or `DOI:{doi}` for the reference service.
    secondary_handle: Option<String>,
    referenced_works: Vec<String>,
}

impl FrontierItem {
    /// The seed reads the reference service only under a located paper id.
    fn for_seed(work: &CatalogWork, secondary_id: Option<String>) -> Self {
        Self {
            key: work.id.clone(),
            secondary_handle: secondary_id,
            referenced_works: work.referenced_works.clone(),
        }
    }

    fn for_work(work: &CatalogWork, secondary_id: Option<String>) -> Self {
        Self {
            key: work.id.clone(),
            secondary_handle: secondary_id.or_else(|| work.doi.as_ref().map(|doi| format!("DOI:{doi}"))),
            referenced_works: work.referenced_works.clone(),
        }
    }
}

/// A frontier item's merged, normalized reference list.
#[derive(Debug)]
struct Gathered {
    parent: Arc<str>,
    references: Vec<NormalizedReference>,
    seen: usize,
    filtered: usize,
}

/// What happened to one reference.
#[derive(Debug)]
enum ReferenceOutcome {
    /// Node committed (or already present) with its edge; carries the node
    /// when this task owns its expansion.
    Kept(Option<FrontierItem>),
    Pruned,
    UnmappedDropped,
    /// The reference points back at its parent.
    SelfCitation,
}

/// State shared by every task of a run.
struct Shared {
    references: Arc<dyn ReferenceSource>,
    mapper: CrossSourceMapper,
    graph: CitationGraph,
    policy: PrunePolicy,
    dedup_key: DedupKeyPolicy,
    max_depth: u32,
}

/// Resolved seed.
struct Seed {
    work: Arc<CatalogWork>,
    secondary_id: Option<String>,
    expansion: Expansion,
}

/// The crawl orchestrator.
pub struct Crawler {
    config: CrawlConfig,
    catalog: Arc<dyn Catalog>,
    shared: Arc<Shared>,
    metrics: Arc<MetricsCollector>,
    semaphore: Arc<Semaphore>,
}

impl fmt::Debug for Crawler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crawler")
            .field("seed", &self.config.seed)
            .field("max_depth", &self.config.max_depth)
            .field("workers", &self.config.workers)
            .finish_non_exhaustive()
    }
}

impl Crawler {
    /// Creates a crawler over the given service implementations.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Config`] if the configuration is out of range.
    pub fn new(
        config: CrawlConfig,
        catalog: Arc<dyn Catalog>,
        references: Arc<dyn ReferenceSource>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self, CrawlError> {
        config.validate()?;
        let cache = Arc::new(IdentityCache::new());
        let mapper = CrossSourceMapper::new(Arc::clone(&catalog), cache, config.min_title_similarity);
        let shared = Shared {
            references,
            mapper,
            graph: CitationGraph::new(),
            policy: PrunePolicy::from(&config),
            dedup_key: config.dedup_key,
            max_depth: config.max_depth,
        };
        debug!(
            workers = config.workers,
            max_depth = config.max_depth,
            sources = ?config.sources,
            threshold = config.min_citations,
            "creating crawler"
        );
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.workers)),
            config,
            catalog,
            shared: Arc::new(shared),
            metrics,
        })
    }

    /// Creates a crawler talking to the public OpenAlex and Semantic Scholar APIs.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Config`] for invalid settings and
    /// [`CrawlError::Client`] if an HTTP client cannot be built.
    pub fn from_config(config: CrawlConfig) -> Result<Self, CrawlError> {
        config.validate()?;
        let metrics = Arc::new(MetricsCollector::new());
        let fetch = Arc::new(
            FetchClient::builder(config.contact_email.as_deref(), Arc::clone(&metrics))
                .service(Service::OpenAlex, &config.openalex)
                .service(Service::SemanticScholar, &config.semantic_scholar)
                .build()?,
        );
        let mailto = config.contact_email.clone();
        let catalog = Arc::new(match &config.openalex_url {
            Some(base) => OpenAlexCatalog::with_base_url(Arc::clone(&fetch), mailto, base.clone()),
            None => OpenAlexCatalog::new(Arc::clone(&fetch), mailto),
        });
        let references = Arc::new(match &config.semantic_scholar_url {
            Some(base) => SemanticScholarSource::with_base_url(fetch, base.clone()),
            None => SemanticScholarSource::new(fetch),
        });
        Self::new(config, catalog, references, metrics)
    }

    #[must_use]
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// The graph accumulated so far.
    #[must_use]
    pub fn graph(&self) -> &CitationGraph {
        &self.shared.graph
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<IdentityCache> {
        self.shared.mapper.cache()
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Runs the crawl to completion, the depth bound, or the global timeout.
    ///
    /// A timeout is not an error: the outcome is returned with
    /// `complete == false` and holds everything committed before it.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::SeedUnresolved`] or
    /// [`CrawlError::SecondarySeedMissing`] when seeding fails.
    #[instrument(skip(self), fields(seed = %self.config.seed, max_depth = self.config.max_depth))]
    pub async fn run(&self) -> Result<CrawlOutcome, CrawlError> {
        // A budget past the clock's range means no deadline.
        let deadline = self
            .config
            .global_timeout
            .and_then(|budget| Instant::now().checked_add(budget));
        let mut state = CrawlState::Seeding;
        self.load_map_cache();

        let seeded = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, self.seed())
                .await
                .unwrap_or_else(|_| {
                    Err(CrawlError::seed_unresolved(
                        &self.config.seed,
                        "global timeout reached while resolving the seed",
                    ))
                }),
            None => self.seed().await,
        };
        let seed = match seeded {
            Ok(seed) => seed,
            Err(error) => {
                advance(&mut state, CrawlState::Failed);
                self.save_map_cache();
                return Err(error);
            }
        };

        info!(
            seed = %seed.work.id,
            title = ?seed.work.title,
            primary = seed.expansion.primary,
            secondary = seed.expansion.secondary,
            "seed resolved"
        );

        let mut frontier = vec![FrontierItem::for_seed(&seed.work, seed.secondary_id.clone())];
        let mut layers_completed = 0;
        let mut failure = None;

        for depth in 1..=self.config.max_depth {
            if frontier.is_empty() {
                break;
            }
            advance(&mut state, CrawlState::LayerActive(depth));
            match self.run_layer(depth, seed.expansion, frontier, deadline).await {
                Ok(next) => {
                    frontier = next;
                    layers_completed = depth;
                    advance(&mut state, CrawlState::LayerComplete(depth));
                }
                Err(DeadlineExpired) => {
                    warn!(depth, "global timeout reached; cancelling in-flight tasks");
                    failure = Some(format!("global timeout reached during layer {depth}"));
                    break;
                }
            }
        }

        let complete = failure.is_none();
        if complete {
            advance(&mut state, CrawlState::Done);
        }
        self.save_map_cache();
        let graph = self.shared.graph.snapshot();
        info!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            layers_completed,
            complete,
            upstream_calls = self.cache().upstream_calls(),
            cache_hits = self.cache().hits(),
            "crawl finished"
        );

        Ok(CrawlOutcome {
            seed_input: self.config.seed.clone(),
            seed_key: seed.work.id.clone(),
            max_depth: self.config.max_depth,
            layers_completed,
            complete,
            failure,
            final_state: state,
            graph,
        })
    }

    /// Resolves the seed, picks the expansion sources, and inserts the seed node.
    async fn seed(&self) -> Result<Seed, CrawlError> {
        let seed_text = self.config.seed.as_str();
        let input = SeedInput::parse(seed_text);
        debug!(?input, "recognized seed form");

        let unresolved = |reason: String| CrawlError::seed_unresolved(seed_text, reason);
        let mut secondary_id = None;

        let work = match &input {
            SeedInput::CatalogId(id) => match self.cache().lookup(&format!("ID:{id}")) {
                Some(Some(work)) => Some(work),
                _ => self
                    .catalog
                    .get_work(id)
                    .await
                    .map_err(|e| unresolved(e.to_string()))?
                    .map(Arc::new),
            },
            SeedInput::Doi(doi) => self
                .catalog
                .find_by_doi(doi)
                .await
                .map_err(|e| unresolved(e.to_string()))?
                .map(Arc::new),
            SeedInput::SecondaryId(id) => {
                let paper = self
                    .shared
                    .references
                    .find_paper(PaperLookup::Id(id))
                    .await
                    .map_err(|e| unresolved(e.to_string()))?
                    .ok_or_else(|| unresolved("unknown to the reference service".to_string()))?;
                secondary_id = Some(paper.paper_id.clone());
                match (&paper.doi, &paper.title) {
                    (Some(doi), _) => self
                        .catalog
                        .find_by_doi(doi)
                        .await
                        .map_err(|e| unresolved(e.to_string()))?
                        .map(Arc::new),
                    (None, Some(title)) => self.best_title_hit(title).await.map_err(unresolved)?,
                    (None, None) => None,
                }
            }
            SeedInput::Title(title) => self.best_title_hit(title).await.map_err(unresolved)?,
        };
        let work = work.ok_or_else(|| unresolved("no matching catalog work".to_string()))?;

        let mut expansion = Expansion::from_selection(self.config.sources, work.referenced_works.len());
        if expansion.secondary && secondary_id.is_none() {
            secondary_id = self.locate_secondary(&work).await;
        }
        if expansion.secondary && secondary_id.is_none() {
            match self.config.sources {
                SourceSelection::SecondaryOnly => {
                    return Err(CrawlError::SecondarySeedMissing {
                        seed: seed_text.to_string(),
                    });
                }
                // Later layers still read both sources.
                SourceSelection::Both => {
                    warn!(seed = %work.id, "seed not found in the reference service; expanding the seed from the catalog only");
                }
                _ => {
                    warn!(seed = %work.id, "seed not found in the reference service; expanding from the catalog only");
                    expansion = Expansion::PRIMARY;
                }
            }
        }

        // References back to the seed resolve without upstream calls.
        let cache = self.cache();
        cache.insert_if_absent(&format!("ID:{}", work.id), Some(Arc::clone(&work)));
        if let Some(id) = &secondary_id {
            cache.insert_if_absent(&format!("S2:{id}"), Some(Arc::clone(&work)));
        }

        let origin = if expansion.secondary && secondary_id.is_some() {
            Origin::Mixed
        } else {
            Origin::OpenAlex
        };
        self.shared
            .graph
            .insert_seed(Work::from_catalog(&work, origin, secondary_id.clone(), 0));

        Ok(Seed {
            work,
            secondary_id,
            expansion,
        })
    }

    /// Preloads the identity cache file, if one is configured.
    fn load_map_cache(&self) {
        let Some(path) = &self.config.map_cache_path else {
            return;
        };
        match self.cache().load_file(path) {
            Ok(loaded) => info!(path = %path.display(), loaded, "identity cache file loaded"),
            Err(error) => warn!(error = %error, "ignoring unreadable identity cache file"),
        }
    }

    /// Writes the identity cache file, if one is configured.
    fn save_map_cache(&self) {
        let Some(path) = &self.config.map_cache_path else {
            return;
        };
        match self.cache().save_file(path) {
            Ok(saved) => debug!(path = %path.display(), saved, "identity cache file written"),
            Err(error) => warn!(error = %error, "failed to write identity cache file"),
        }
    }

    /// Most relevant catalog hit for a title; ties go to the more cited work.
    async fn best_title_hit(&self, title: &str) -> Result<Option<Arc<CatalogWork>>, String> {
        let hits = self.catalog.search(title, None).await.map_err(|e| e.to_string())?;
        Ok(hits
            .into_iter()
            .max_by(|a, b| {
                a.relevance_score
                    .unwrap_or(0.0)
                    .total_cmp(&b.relevance_score.unwrap_or(0.0))
                    .then(a.cited_by_count.cmp(&b.cited_by_count))
            })
            .map(Arc::new))
    }

    /// Finds the seed in the reference service by DOI, then by title.
    async fn locate_secondary(&self, work: &CatalogWork) -> Option<String> {
        let lookups = [
            work.doi.as_deref().map(PaperLookup::Doi),
            work.title.as_deref().map(PaperLookup::Title),
        ];
        for lookup in lookups.into_iter().flatten() {
            match self.shared.references.find_paper(lookup).await {
                Ok(Some(paper)) => return Some(paper.paper_id),
                Ok(None) => {}
                Err(error) => warn!(?lookup, error = %error, "reference service seed lookup failed"),
            }
        }
        None
    }

    /// Runs one layer to its barrier and returns the next frontier.
    #[instrument(skip(self, frontier, deadline), fields(frontier_len = frontier.len()))]
    async fn run_layer(
        &self,
        depth: u32,
        expansion: Expansion,
        frontier: Vec<FrontierItem>,
        deadline: Option<Instant>,
    ) -> Result<Vec<FrontierItem>, DeadlineExpired> {
        let layer_started = Instant::now();
        let mut task_total = Duration::ZERO;
        let mut stats = LayerMetrics {
            depth,
            frontier: frontier.len(),
            ..LayerMetrics::default()
        };

        // Phase 1: reference lists.
        let bar = layer_bar(self.config.progress, depth, frontier.len(), "fetching reference lists");
        let mut fetches = LayerTasks::new(deadline);
        for item in frontier {
            let shared = Arc::clone(&self.shared);
            let semaphore = Arc::clone(&self.semaphore);
            fetches.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                let started = Instant::now();
                let gathered = gather(&shared, expansion, item).await;
                (started.elapsed(), gathered)
            });
        }

        let mut batches = Vec::new();
        while let Some(joined) = fetches.next().await? {
            bar.inc(1);
            match joined {
                Ok((elapsed, gathered)) => {
                    task_total += elapsed;
                    match gathered {
                        Some(batch) => {
                            stats.seen += batch.seen;
                            stats.filtered += batch.filtered;
                            batches.push(batch);
                        }
                        None => stats.failed += 1,
                    }
                }
                Err(error) => {
                    stats.failed += 1;
                    warn!(error = %error, "reference list task panicked");
                }
            }
        }
        bar.finish_and_clear();

        // Phase 2: map and commit.
        let total: usize = batches.iter().map(|b| b.references.len()).sum();
        let bar = layer_bar(self.config.progress, depth, total, "mapping references");
        let mut mappings = LayerTasks::new(deadline);
        for batch in batches {
            for reference in batch.references {
                let shared = Arc::clone(&self.shared);
                let semaphore = Arc::clone(&self.semaphore);
                let parent = Arc::clone(&batch.parent);
                mappings.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let started = Instant::now();
                    let outcome = resolve_reference(&shared, &parent, depth, &reference).await;
                    (started.elapsed(), outcome)
                });
            }
        }
        debug!(depth, tasks = mappings.len(), "mapping tasks spawned");

        let mut next = Vec::new();
        while let Some(joined) = mappings.next().await? {
            bar.inc(1);
            match joined {
                Ok((elapsed, outcome)) => {
                    task_total += elapsed;
                    match outcome {
                        ReferenceOutcome::Kept(expand) => {
                            stats.kept += 1;
                            next.extend(expand);
                        }
                        ReferenceOutcome::Pruned => stats.pruned += 1,
                        ReferenceOutcome::UnmappedDropped => stats.unmapped_dropped += 1,
                        ReferenceOutcome::SelfCitation => {}
                    }
                }
                Err(error) => {
                    stats.failed += 1;
                    warn!(error = %error, "mapping task panicked");
                }
            }
        }
        bar.finish_and_clear();

        next.sort_by(|a, b| a.key.cmp(&b.key));
        stats.expanded = next.len();
        stats.finish(layer_started.elapsed(), task_total);
        info!(
            depth,
            frontier = stats.frontier,
            seen = stats.seen,
            filtered = stats.filtered,
            pruned = stats.pruned,
            unmapped_dropped = stats.unmapped_dropped,
            kept = stats.kept,
            expanded = stats.expanded,
            failed = stats.failed,
            wall_secs = stats.wall_secs,
            parallelism = ?stats.effective_parallelism,
            "layer complete"
        );
        self.metrics.record_layer(stats);
        Ok(next)
    }
}

fn advance(state: &mut CrawlState, next: CrawlState) {
    debug!(from = %state, to = %next, "crawl state transition");
    *state = next;
}

/// Fetches and normalizes one frontier item's references. `None` when no
/// enabled source produced a list.
async fn gather(shared: &Shared, expansion: Expansion, item: FrontierItem) -> Option<Gathered> {
    let mut raw: Vec<RawReference> = Vec::new();
    if expansion.primary {
        raw.extend(item.referenced_works.iter().map(RawReference::from_canonical_id));
    }

    let mut failure = None;
    if expansion.secondary
        && let Some(handle) = &item.secondary_handle
    {
        match shared.references.fetch_references(handle).await {
            Ok(references) => raw.extend(references),
            Err(error) => failure = Some(error),
        }
    }
    match failure {
        Some(error) if raw.is_empty() => {
            warn!(parent = %item.key, error_class = error.class(), error = %error, "reference list unavailable");
            return None;
        }
        Some(error) => {
            warn!(parent = %item.key, error = %error, "reference service failed; using catalog references only");
        }
        None => {}
    }

    let seen = raw.len();
    let mut filtered = 0;
    let normalized: Vec<NormalizedReference> = raw
        .into_iter()
        .filter_map(|reference| {
            normalize(reference)
                .inspect_err(|_| filtered += 1)
                .ok()
        })
        .collect();
    let references = merge_references(normalized, shared.dedup_key);
    debug!(parent = %item.key, seen, filtered, unique = references.len(), "reference list gathered");

    Some(Gathered {
        parent: Arc::from(item.key),
        references,
        seen,
        filtered,
    })
}

/// Pre-prune, map, post-prune, and commit one reference of `parent`.
async fn resolve_reference(
    shared: &Shared,
    parent: &str,
    depth: u32,
    reference: &NormalizedReference,
) -> ReferenceOutcome {
    let policy = &shared.policy;
    if !policy.keep_before_mapping(depth, reference.reference.citation_count) {
        return ReferenceOutcome::Pruned;
    }

    // Already a node: only the edge is new.
    if let Some(id) = &reference.reference.canonical_id
        && shared.graph.link_existing(parent, id, depth)
    {
        return if id == parent {
            ReferenceOutcome::SelfCitation
        } else {
            ReferenceOutcome::Kept(None)
        };
    }

    let expandable = depth < shared.max_depth;
    let secondary_id = reference.reference.secondary_id.clone();

    match shared.mapper.map(reference).await {
        Some(mapped) => {
            let work = mapped.work;
            let decision = if shared.graph.contains(&work.id) {
                PostDecision::KeepLeaf
            } else {
                policy.after_mapping(depth, work.cited_by_count)
            };
            if !decision.keeps() {
                debug!(work = %work.id, count = ?work.cited_by_count, "pruned after mapping");
                return ReferenceOutcome::Pruned;
            }
            let origin = match reference.reference.origin {
                Some(Service::SemanticScholar) => Origin::Mixed,
                _ => Origin::OpenAlex,
            };
            let node = Work::from_catalog(&work, origin, secondary_id.clone(), depth);
            match shared.graph.commit(parent, node, depth) {
                None => ReferenceOutcome::SelfCitation,
                Some(commit) => {
                    let expand = commit == NodeCommit::New
                        && decision == PostDecision::KeepAndExpand
                        && expandable;
                    ReferenceOutcome::Kept(expand.then(|| FrontierItem::for_work(&work, secondary_id)))
                }
            }
        }
        None => {
            let decision = match policy.for_unmapped() {
                PostDecision::Drop => PostDecision::Drop,
                _ => policy.after_mapping(depth, reference.reference.citation_count),
            };
            let node = decision
                .keeps()
                .then(|| Work::synthetic(&reference.reference, depth))
                .flatten();
            let Some(node) = node else {
                return ReferenceOutcome::UnmappedDropped;
            };
            let key = node.key.clone();
            match shared.graph.commit(parent, node, depth) {
                None => ReferenceOutcome::SelfCitation,
                Some(commit) => {
                    let expand = commit == NodeCommit::New
                        && decision == PostDecision::KeepAndExpand
                        && expandable;
                    let handle = secondary_id.or_else(|| {
                        reference.reference.doi.as_ref().map(|doi| format!("DOI:{doi}"))
                    });
                    ReferenceOutcome::Kept(expand.then(|| FrontierItem {
                        key,
                        secondary_handle: handle,
                        referenced_works: Vec::new(),
                    }))
                }
            }
        }
    }
}
