//! OpenAlex catalog client.
//!
//! Calls `/works/{id}` for exact lookups and `/works?filter=...` /
//! `/works?search=...` for DOI and text lookups. A configured contact
//! address is sent as the `mailto` parameter, which routes requests to
//! OpenAlex's polite pool.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{Catalog, CatalogWork, normalize_doi, short_work_id};
use crate::fetch::{FetchClient, FetchError, Service};

/// Default OpenAlex API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openalex.org";

/// Hits requested per text search.
const SEARCH_PAGE_SIZE: &str = "5";

// ==================== OpenAlex API Response Types ====================

#[derive(Debug, Deserialize)]
struct WorkList {
    #[serde(default)]
    results: Vec<WorkJson>,
}

#[derive(Debug, Deserialize)]
struct WorkJson {
    id: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_year: Option<i32>,
    #[serde(rename = "type")]
    work_type: Option<String>,
    cited_by_count: Option<u64>,
    #[serde(default)]
    is_retracted: Option<bool>,
    #[serde(default)]
    authorships: Vec<Authorship>,
    primary_location: Option<Location>,
    host_venue: Option<NamedEntity>,
    #[serde(default)]
    referenced_works: Vec<String>,
    relevance_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Authorship {
    author: Option<NamedEntity>,
}

#[derive(Debug, Deserialize)]
struct Location {
    source: Option<NamedEntity>,
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    display_name: Option<String>,
}

impl WorkJson {
    /// Converts to the crate's work type; `None` if the id is unusable.
    fn into_work(self) -> Option<CatalogWork> {
        let id = short_work_id(self.id.as_deref()?)?;
        let venue = self
            .primary_location
            .and_then(|loc| loc.source)
            .and_then(|src| src.display_name)
            .or_else(|| self.host_venue.and_then(|hv| hv.display_name))
            .filter(|v| !v.trim().is_empty());
        let authors = self
            .authorships
            .into_iter()
            .filter_map(|a| a.author.and_then(|author| author.display_name))
            .filter(|name| !name.is_empty())
            .collect();
        Some(CatalogWork {
            id,
            doi: self.doi.as_deref().and_then(normalize_doi),
            title: self.title.or(self.display_name).filter(|t| !t.trim().is_empty()),
            year: self.publication_year,
            venue,
            work_type: self.work_type,
            authors,
            cited_by_count: self.cited_by_count,
            is_retracted: self.is_retracted.unwrap_or(false),
            referenced_works: self
                .referenced_works
                .iter()
                .filter_map(|w| short_work_id(w))
                .collect(),
            relevance_score: self.relevance_score,
        })
    }
}

// ==================== OpenAlexCatalog ====================

/// [`Catalog`] backed by the OpenAlex REST API.
pub struct OpenAlexCatalog {
    fetch: Arc<FetchClient>,
    base_url: String,
    mailto: Option<String>,
}

impl OpenAlexCatalog {
    /// Creates a catalog client against the public API.
    #[must_use]
    pub fn new(fetch: Arc<FetchClient>, mailto: Option<String>) -> Self {
        Self::with_base_url(fetch, mailto, DEFAULT_BASE_URL)
    }

    /// Creates a catalog client with a custom base URL (for testing with wiremock).
    #[must_use]
    pub fn with_base_url(
        fetch: Arc<FetchClient>,
        mailto: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetch,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mailto: mailto.filter(|m| !m.trim().is_empty()),
        }
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, FetchError> {
        let raw = format!("{}{path}", self.base_url);
        let mut url = Url::parse(&raw).map_err(|_| FetchError::invalid_url(Service::OpenAlex, raw))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            if let Some(mailto) = &self.mailto {
                query.append_pair("mailto", mailto);
            }
        }
        // Avoid a dangling `?` when there are no parameters.
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    async fn list(&self, params: &[(&str, &str)]) -> Result<Vec<CatalogWork>, FetchError> {
        let url = self.url("/works", params)?;
        let list: WorkList = self.fetch.get_json(Service::OpenAlex, url).await?;
        Ok(list.results.into_iter().filter_map(WorkJson::into_work).collect())
    }
}

impl std::fmt::Debug for OpenAlexCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAlexCatalog")
            .field("base_url", &self.base_url)
            .field("mailto", &self.mailto)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Catalog for OpenAlexCatalog {
    #[instrument(skip(self))]
    async fn get_work(&self, id: &str) -> Result<Option<CatalogWork>, FetchError> {
        let path = format!("/works/{}", urlencoding::encode(id.trim()));
        let url = self.url(&path, &[])?;
        match self.fetch.get_json::<WorkJson>(Service::OpenAlex, url).await {
            Ok(work) => Ok(work.into_work()),
            Err(e) if e.is_not_found() => {
                debug!(id, "work not found in catalog");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn find_by_doi(&self, doi: &str) -> Result<Option<CatalogWork>, FetchError> {
        let filter = format!("doi:{doi}");
        let mut hits = self.list(&[("filter", filter.as_str()), ("per_page", "1")]).await?;
        Ok((!hits.is_empty()).then(|| hits.swap_remove(0)))
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, year: Option<i32>) -> Result<Vec<CatalogWork>, FetchError> {
        let year_filter = year.map(|y| format!("publication_year:{y}"));
        let mut params = vec![("search", query), ("per_page", SEARCH_PAGE_SIZE)];
        if let Some(filter) = year_filter.as_deref() {
            params.push(("filter", filter));
        }
        self.list(&params).await
    }
}
