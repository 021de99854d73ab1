//! Cross-source mapping of normalized references onto catalog works.
//!
//! Attempts, in order, stopping at the first success:
//!
//! | Attempt | Cache key | Catalog call |
//! |---------|-----------|--------------|
//! | id | `ID:{id}` | `get_work` |
//! | doi | `DOI:{doi}` | `find_by_doi` |
//! | doi search | `DOISEARCH:{doi or preprint id}` | `search`, hit DOI must contain the query |
//! | title | `TITLE:{title key}` | `search` + similarity check |
//! | title + year | `TITLEYEAR:{title key}\|{year}` | `search` filtered by year + similarity check |
//!
//! Attempts whose inputs are missing are skipped. Every attempt goes through
//! the [`IdentityCache`], so a key is sent upstream at most once per run no
//! matter how many tasks need it. A fetch failure is cached as a transient
//! miss and the chain moves on to the next attempt.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::cache::{CacheOutcome, IdentityCache};
use super::normalizer::{NormalizedReference, title_key};
use crate::fetch::FetchError;
use crate::sources::{Catalog, CatalogWork};

/// One step of the mapping chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapAttempt {
    Id,
    Doi,
    DoiSearch,
    Title,
    TitleYear,
}

impl MapAttempt {
    /// Short name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Doi => "doi",
            Self::DoiSearch => "doi_search",
            Self::Title => "title",
            Self::TitleYear => "title_year",
        }
    }
}

/// Successful mapping.
#[derive(Debug, Clone)]
pub struct Mapped {
    pub work: Arc<CatalogWork>,
    /// The attempt that produced the work, or `None` if answered by the
    /// secondary-id alias.
    pub via: Option<MapAttempt>,
}

/// Resolves references to canonical catalog works.
pub struct CrossSourceMapper {
    catalog: Arc<dyn Catalog>,
    cache: Arc<IdentityCache>,
    min_title_similarity: f64,
}

impl std::fmt::Debug for CrossSourceMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossSourceMapper")
            .field("cache_entries", &self.cache.len())
            .field("min_title_similarity", &self.min_title_similarity)
            .finish_non_exhaustive()
    }
}

impl CrossSourceMapper {
    /// Creates a mapper over `catalog`, sharing `cache` with other mappers.
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>, cache: Arc<IdentityCache>, min_title_similarity: f64) -> Self {
        Self {
            catalog,
            cache,
            min_title_similarity,
        }
    }

    /// The shared identity cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<IdentityCache> {
        &self.cache
    }

    /// Fetches a work by canonical id through the cache.
    pub async fn work_by_id(&self, id: &str) -> Option<Arc<CatalogWork>> {
        let key = format!("ID:{id}");
        self.cache
            .get_or_resolve(&key, || self.run(MapAttempt::Id, &key, id, None))
            .await
    }

    /// Walks the mapping chain. `None` means every applicable attempt missed.
    #[instrument(skip_all, fields(
        canonical = ?reference.reference.canonical_id,
        secondary = ?reference.reference.secondary_id,
        doi = ?reference.reference.doi,
    ))]
    pub async fn map(&self, reference: &NormalizedReference) -> Option<Mapped> {
        let alias = reference
            .reference
            .secondary_id
            .as_ref()
            .map(|id| format!("S2:{id}"));

        if let Some(alias) = &alias
            && let Some(outcome) = self.cache.lookup(alias)
        {
            debug!(%alias, hit = outcome.is_some(), "answered by secondary alias");
            return outcome.map(|work| Mapped { work, via: None });
        }

        let mut result = None;
        for (attempt, key, query, year) in attempts(reference) {
            let outcome = self
                .cache
                .get_or_resolve(&key, || self.run(attempt, &key, &query, year))
                .await;
            if let Some(work) = outcome {
                debug!(attempt = attempt.as_str(), work = %work.id, "reference mapped");
                result = Some(Mapped {
                    work,
                    via: Some(attempt),
                });
                break;
            }
        }

        if let Some(alias) = &alias {
            self.cache
                .insert_if_absent(alias, result.as_ref().map(|m| Arc::clone(&m.work)));
        }
        if result.is_none() {
            debug!("reference unmapped after all attempts");
        }
        result
    }

    /// Performs one upstream attempt; failures become transient misses.
    async fn run(&self, attempt: MapAttempt, key: &str, query: &str, year: Option<i32>) -> CacheOutcome {
        let result = match attempt {
            MapAttempt::Id => self.catalog.get_work(query).await,
            MapAttempt::Doi => self.catalog.find_by_doi(query).await,
            MapAttempt::DoiSearch => self
                .catalog
                .search(query, None)
                .await
                .map(|hits| hits.into_iter().find(|hit| doi_contains(hit, query))),
            MapAttempt::Title => self
                .catalog
                .search(query, None)
                .await
                .map(|hits| self.best_title_match(query, hits)),
            MapAttempt::TitleYear => self
                .catalog
                .search(query, year)
                .await
                .map(|hits| self.best_title_match(query, hits)),
        };
        match result {
            Ok(work) => work.map(Arc::new),
            Err(error) => {
                log_attempt_failure(attempt, query, &error);
                self.cache.mark_transient(key);
                None
            }
        }
    }

    /// The most similar hit, if it clears the similarity floor.
    fn best_title_match(&self, wanted: &str, hits: Vec<CatalogWork>) -> Option<CatalogWork> {
        let wanted = title_key(wanted)?;
        hits.into_iter()
            .filter_map(|hit| {
                let candidate = hit.title.as_deref().and_then(title_key)?;
                let score = strsim::normalized_levenshtein(&wanted, &candidate);
                (score >= self.min_title_similarity).then_some((score, hit))
            })
            .max_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, hit)| hit)
    }
}

/// Whether a search hit's DOI contains `query` (a DOI or preprint id).
fn doi_contains(hit: &CatalogWork, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    !query.is_empty()
        && hit
            .doi
            .as_deref()
            .is_some_and(|doi| doi.to_lowercase().contains(&query))
}

fn log_attempt_failure(attempt: MapAttempt, query: &str, error: &FetchError) {
    warn!(
        attempt = attempt.as_str(),
        query,
        error_class = error.class(),
        error = %error,
        "mapping attempt failed; treating as miss"
    );
}

/// The applicable attempts for `reference`: `(attempt, cache key, query, year)`.
fn attempts(reference: &NormalizedReference) -> Vec<(MapAttempt, String, String, Option<i32>)> {
    let r = &reference.reference;
    let mut out = Vec::with_capacity(5);

    if let Some(id) = &r.canonical_id {
        out.push((MapAttempt::Id, format!("ID:{id}"), id.clone(), None));
    }
    if let Some(doi) = &r.doi {
        out.push((MapAttempt::Doi, format!("DOI:{doi}"), doi.clone(), None));
        // Derived preprint DOIs are rarely indexed verbatim; search the preprint id instead.
        let fuzzy = match (&r.arxiv_id, &reference.preprint) {
            (Some(id), Some(_)) if doi.ends_with(id.as_str()) => id.clone(),
            _ => doi.clone(),
        };
        out.push((MapAttempt::DoiSearch, format!("DOISEARCH:{fuzzy}"), fuzzy, None));
    }
    if let (Some(key), Some(title)) = (&reference.title_key, &r.title) {
        out.push((MapAttempt::Title, format!("TITLE:{key}"), title.clone(), None));
        if let Some(year) = r.year {
            out.push((
                MapAttempt::TitleYear,
                format!("TITLEYEAR:{key}|{year}"),
                title.clone(),
                Some(year),
            ));
        }
    }
    out
}
