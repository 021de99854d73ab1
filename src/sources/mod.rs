//! The two external bibliographic services, behind async traits.
//!
//! # Architecture
//!
//! - [`Catalog`] - the primary catalog: canonical identities, metadata,
//!   citation counts, and each work's outgoing reference ids
//! - [`ReferenceSource`] - the secondary service: per-paper reference lists
//!   carrying external identifiers
//! - [`OpenAlexCatalog`] / [`SemanticScholarSource`] - HTTP implementations
//!   over the shared [`FetchClient`](crate::fetch::FetchClient)
//! - [`seed`] - recognition of the seed input's identifier form
//!
//! The crawler only ever holds `Arc<dyn Catalog>` and
//! `Arc<dyn ReferenceSource>`, so tests substitute in-memory mocks.

mod openalex;
pub mod seed;
mod semantic_scholar;

pub use openalex::OpenAlexCatalog;
pub use semantic_scholar::SemanticScholarSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::fetch::{FetchError, Service};

/// A work as described by the primary catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogWork {
    /// Canonical id (`W` followed by digits).
    pub id: String,
    /// Bare lowercase DOI.
    pub doi: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub work_type: Option<String>,
    pub authors: Vec<String>,
    pub cited_by_count: Option<u64>,
    pub is_retracted: bool,
    /// Canonical ids of the works this one cites.
    pub referenced_works: Vec<String>,
    /// Search relevance, present only on search hits.
    #[serde(skip)]
    pub relevance_score: Option<f64>,
}

/// One entry of a reference list, before normalization and mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReference {
    /// Which service produced this reference.
    pub origin: Option<Service>,
    /// Canonical id, when the origin already knows it.
    pub canonical_id: Option<String>,
    /// Secondary-service paper id.
    pub secondary_id: Option<String>,
    pub doi: Option<String>,
    /// arXiv identifier as reported (no prefix).
    pub arxiv_id: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    /// Citation count as reported by the origin, if it reports one.
    pub citation_count: Option<u64>,
}

impl RawReference {
    /// A primary-catalog reference known only by its canonical id.
    #[must_use]
    pub fn from_canonical_id(id: impl Into<String>) -> Self {
        Self {
            origin: Some(Service::OpenAlex),
            canonical_id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// A paper located in the secondary service.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryPaper {
    pub paper_id: String,
    /// Bare lowercase DOI, if the service knows one.
    pub doi: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub citation_count: Option<u64>,
}

/// How to locate a paper in the secondary service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperLookup<'a> {
    /// Exact lookup by paper id.
    Id(&'a str),
    /// Exact lookup by DOI.
    Doi(&'a str),
    /// Free-text title search; the most-cited hit wins.
    Title(&'a str),
}

/// The primary catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetches a work by canonical id. A missing work is `Ok(None)`.
    async fn get_work(&self, id: &str) -> Result<Option<CatalogWork>, FetchError>;

    /// Exact DOI match.
    async fn find_by_doi(&self, doi: &str) -> Result<Option<CatalogWork>, FetchError>;

    /// Free-text search, optionally restricted to a publication year.
    /// Hits are returned in the catalog's relevance order.
    async fn search(&self, query: &str, year: Option<i32>) -> Result<Vec<CatalogWork>, FetchError>;
}

/// The secondary reference service.
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    /// Reference list of a paper. `paper` is a paper id or `DOI:{doi}`.
    async fn fetch_references(&self, paper: &str) -> Result<Vec<RawReference>, FetchError>;

    /// Locates a paper.
    async fn find_paper(&self, lookup: PaperLookup<'_>) -> Result<Option<SecondaryPaper>, FetchError>;
}

/// Extracts the trailing `W\d+` id from a catalog id or id URL.
#[must_use]
pub fn short_work_id(id: &str) -> Option<String> {
    let tail = id.trim().trim_end_matches('/').rsplit('/').next()?;
    let mut chars = tail.chars();
    let first = chars.next()?;
    if !first.eq_ignore_ascii_case(&'w') || tail.len() < 2 || !chars.all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("W{}", &tail[1..]))
}

/// Strips DOI URL/prefix decorations and lowercases.
#[must_use]
pub fn normalize_doi(doi: &str) -> Option<String> {
    let trimmed = doi.trim();
    let lower = trimmed.to_ascii_lowercase();
    let bare = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "http://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))
        .unwrap_or(&lower)
        .trim();
    if bare.starts_with("10.") && bare.contains('/') {
        Some(bare.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_work_id() {
        assert_eq!(short_work_id("https://openalex.org/W2741809807").as_deref(), Some("W2741809807"));
        assert_eq!(short_work_id("w42").as_deref(), Some("W42"));
        assert_eq!(short_work_id("W"), None);
        assert_eq!(short_work_id("A123"), None);
        assert_eq!(short_work_id("https://openalex.org/W12x"), None);
    }

    #[test]
    fn test_normalize_doi() {
        assert_eq!(
            normalize_doi("https://doi.org/10.1103/PhysRevLett.116.061102").as_deref(),
            Some("10.1103/physrevlett.116.061102")
        );
        assert_eq!(normalize_doi(" doi:10.1/ABC ").as_deref(), Some("10.1/abc"));
        assert_eq!(normalize_doi("not a doi"), None);
        assert_eq!(normalize_doi(""), None);
    }
}
