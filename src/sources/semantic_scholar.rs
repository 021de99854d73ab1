//! Semantic Scholar Graph API client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{PaperLookup, RawReference, ReferenceSource, SecondaryPaper, normalize_doi};
use crate::fetch::{FetchClient, FetchError, Service};

/// Default Graph API base URL.
const DEFAULT_BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";

/// Field set requested for reference lists.
const REFERENCE_FIELDS: &str = "references.paperId,references.title,references.year,\
references.externalIds,references.citationCount,references.venue";

/// Field set requested for paper lookups.
const PAPER_FIELDS: &str = "paperId,externalIds,title,year,citationCount";

/// Hits requested per title search.
const SEARCH_LIMIT: &str = "5";

#[derive(Debug, Deserialize)]
struct ReferencesJson {
    #[serde(default)]
    references: Option<Vec<ReferenceJson>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceJson {
    paper_id: Option<String>,
    title: Option<String>,
    year: Option<i32>,
    external_ids: Option<ExternalIds>,
    citation_count: Option<u64>,
    venue: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
    #[serde(rename = "CorpusId")]
    corpus_id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaperJson {
    paper_id: Option<String>,
    external_ids: Option<ExternalIds>,
    title: Option<String>,
    year: Option<i32>,
    citation_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchJson {
    #[serde(default)]
    data: Vec<PaperJson>,
}

impl ReferenceJson {
    fn into_reference(self) -> RawReference {
        let ids = self.external_ids.unwrap_or_default();
        // Papers without a paperId still carry a corpus id we can key on.
        let secondary_id = self.paper_id.or_else(|| {
            ids.corpus_id.as_ref().map(|v| match v {
                serde_json::Value::String(s) => format!("CorpusId:{s}"),
                other => format!("CorpusId:{other}"),
            })
        });
        RawReference {
            origin: Some(Service::SemanticScholar),
            canonical_id: None,
            secondary_id,
            doi: ids.doi.as_deref().and_then(normalize_doi),
            arxiv_id: ids.arxiv.filter(|a| !a.trim().is_empty()),
            title: self.title,
            year: self.year,
            venue: self.venue.filter(|v| !v.trim().is_empty()),
            citation_count: self.citation_count,
        }
    }
}

impl PaperJson {
    fn into_paper(self) -> Option<SecondaryPaper> {
        Some(SecondaryPaper {
            paper_id: self.paper_id?,
            doi: self
                .external_ids
                .and_then(|ids| ids.doi)
                .as_deref()
                .and_then(normalize_doi),
            title: self.title,
            year: self.year,
            citation_count: self.citation_count,
        })
    }
}

/// [`ReferenceSource`] backed by the Semantic Scholar Graph API.
pub struct SemanticScholarSource {
    fetch: Arc<FetchClient>,
    base_url: String,
}

impl SemanticScholarSource {
    /// Creates a client against the public Graph API.
    #[must_use]
    pub fn new(fetch: Arc<FetchClient>) -> Self {
        Self::with_base_url(fetch, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    #[must_use]
    pub fn with_base_url(fetch: Arc<FetchClient>, base_url: impl Into<String>) -> Self {
        Self {
            fetch,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, FetchError> {
        let raw = format!("{}{path}", self.base_url);
        let mut url =
            Url::parse(&raw).map_err(|_| FetchError::invalid_url(Service::SemanticScholar, raw))?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }
}

impl std::fmt::Debug for SemanticScholarSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticScholarSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReferenceSource for SemanticScholarSource {
    #[instrument(skip(self))]
    async fn fetch_references(&self, paper: &str) -> Result<Vec<RawReference>, FetchError> {
        let paper = paper.trim();
        if paper.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url(&format!("/paper/{paper}"), &[("fields", REFERENCE_FIELDS)])?;
        let body: ReferencesJson = self.fetch.get_json(Service::SemanticScholar, url).await?;
        let references: Vec<RawReference> = body
            .references
            .unwrap_or_default()
            .into_iter()
            .map(ReferenceJson::into_reference)
            .collect();
        debug!(paper, count = references.len(), "fetched reference list");
        Ok(references)
    }

    #[instrument(skip(self))]
    async fn find_paper(&self, lookup: PaperLookup<'_>) -> Result<Option<SecondaryPaper>, FetchError> {
        let path = match lookup {
            PaperLookup::Id(id) => format!("/paper/{id}"),
            PaperLookup::Doi(doi) => format!("/paper/DOI:{doi}"),
            PaperLookup::Title(title) => return self.search_paper(title).await,
        };
        let url = self.url(&path, &[("fields", PAPER_FIELDS)])?;
        match self.fetch.get_json::<PaperJson>(Service::SemanticScholar, url).await {
            Ok(paper) => Ok(paper.into_paper()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl SemanticScholarSource {
    /// Title search; the most-cited hit (then the most recent) wins.
    async fn search_paper(&self, title: &str) -> Result<Option<SecondaryPaper>, FetchError> {
        let url = self.url(
            "/paper/search",
            &[("query", title), ("fields", PAPER_FIELDS), ("limit", SEARCH_LIMIT)],
        )?;
        let body: SearchJson = self.fetch.get_json(Service::SemanticScholar, url).await?;
        Ok(body
            .data
            .into_iter()
            .filter_map(PaperJson::into_paper)
            .max_by_key(|p| (p.citation_count.unwrap_or(0), p.year.unwrap_or(0))))
    }
}
