//! In-memory, call-counting service implementations.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use citegraph_core::{
    Catalog, CatalogWork, FetchError, PaperLookup, RawReference, ReferenceSource, SecondaryPaper, Service,
};

/// A recorded catalog call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogCall {
    GetWork(String),
    FindByDoi(String),
    Search(String, Option<i32>),
}

/// Catalog over a fixed set of works.
#[derive(Debug, Default)]
pub struct MockCatalog {
    works: HashMap<String, CatalogWork>,
    latency: Duration,
    slow: HashMap<String, Duration>,
    failing: Vec<String>,
    calls: Mutex<Vec<CatalogCall>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_work(mut self, work: CatalogWork) -> Self {
        self.works.insert(work.id.clone(), work);
        self
    }

    /// Delay applied to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Extra delay for `get_work(id)`.
    pub fn with_slow_id(mut self, id: &str, delay: Duration) -> Self {
        self.slow.insert(id.to_string(), delay);
        self
    }

    /// `get_work(id)` fails with a 503.
    pub fn with_failing_id(mut self, id: &str) -> Self {
        self.failing.push(id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<CatalogCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn get_work_calls(&self, id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, CatalogCall::GetWork(x) if x == id))
            .count()
    }

    pub fn find_by_doi_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, CatalogCall::FindByDoi(_)))
            .count()
    }

    pub fn search_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, CatalogCall::Search(..)))
            .count()
    }

    async fn record(&self, call: CatalogCall) {
        let extra = match &call {
            CatalogCall::GetWork(id) => self.slow.get(id).copied().unwrap_or_default(),
            _ => Duration::ZERO,
        };
        self.calls.lock().unwrap().push(call);
        let delay = self.latency + extra;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn get_work(&self, id: &str) -> Result<Option<CatalogWork>, FetchError> {
        self.record(CatalogCall::GetWork(id.to_string())).await;
        if self.failing.iter().any(|f| f == id) {
            return Err(FetchError::http_status(
                Service::OpenAlex,
                format!("mock://works/{id}"),
                503,
            ));
        }
        Ok(self.works.get(id).cloned())
    }

    async fn find_by_doi(&self, doi: &str) -> Result<Option<CatalogWork>, FetchError> {
        self.record(CatalogCall::FindByDoi(doi.to_string())).await;
        Ok(self
            .works
            .values()
            .find(|w| w.doi.as_deref() == Some(doi))
            .cloned())
    }

    async fn search(&self, query: &str, year: Option<i32>) -> Result<Vec<CatalogWork>, FetchError> {
        self.record(CatalogCall::Search(query.to_string(), year)).await;
        let query = query.to_lowercase();
        let mut hits: Vec<CatalogWork> = self
            .works
            .values()
            .filter(|w| year.is_none() || w.year == year)
            .filter(|w| {
                let title = w.title.as_deref().unwrap_or_default().to_lowercase();
                let doi = w.doi.as_deref().unwrap_or_default();
                (!title.is_empty() && (title.contains(&query) || query.contains(&title)))
                    || (!doi.is_empty() && query.contains(doi))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(hits)
    }
}

/// Reference service over fixed reference lists.
#[derive(Debug, Default)]
pub struct MockReferenceSource {
    /// Reference lists by paper id or `DOI:{doi}` handle.
    lists: HashMap<String, Vec<RawReference>>,
    papers: Vec<SecondaryPaper>,
    failing: Vec<String>,
    fetch_calls: Mutex<Vec<String>>,
    find_calls: Mutex<usize>,
}

impl MockReferenceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_references(mut self, handle: &str, references: Vec<RawReference>) -> Self {
        self.lists.insert(handle.to_string(), references);
        self
    }

    pub fn with_paper(mut self, paper: SecondaryPaper) -> Self {
        self.papers.push(paper);
        self
    }

    /// `fetch_references(handle)` fails with a 503.
    pub fn failing(mut self, handle: &str) -> Self {
        self.failing.push(handle.to_string());
        self
    }

    pub fn fetch_calls(&self) -> Vec<String> {
        self.fetch_calls.lock().unwrap().clone()
    }

    pub fn find_calls(&self) -> usize {
        *self.find_calls.lock().unwrap()
    }
}

#[async_trait]
impl ReferenceSource for MockReferenceSource {
    async fn fetch_references(&self, paper: &str) -> Result<Vec<RawReference>, FetchError> {
        self.fetch_calls.lock().unwrap().push(paper.to_string());
        if self.failing.iter().any(|h| h == paper) {
            return Err(FetchError::http_status(
                Service::SemanticScholar,
                format!("mock://paper/{paper}"),
                503,
            ));
        }
        Ok(self.lists.get(paper).cloned().unwrap_or_default())
    }

    async fn find_paper(&self, lookup: PaperLookup<'_>) -> Result<Option<SecondaryPaper>, FetchError> {
        *self.find_calls.lock().unwrap() += 1;
        Ok(self
            .papers
            .iter()
            .find(|p| match lookup {
                PaperLookup::Id(id) => p.paper_id == id,
                PaperLookup::Doi(doi) => p.doi.as_deref() == Some(doi),
                PaperLookup::Title(title) => p.title.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(title)),
            })
            .cloned())
    }
}

/// A catalog work titled after its id.
pub fn work(id: &str, cited_by: u64, references: &[&str]) -> CatalogWork {
    CatalogWork {
        id: id.to_string(),
        title: Some(format!("Collected findings on topic {id}")),
        year: Some(2015),
        cited_by_count: Some(cited_by),
        referenced_works: references.iter().map(ToString::to_string).collect(),
        ..CatalogWork::default()
    }
}

/// A secondary-service reference.
pub fn s2_reference(paper_id: &str, doi: Option<&str>, title: &str, citations: Option<u64>) -> RawReference {
    RawReference {
        origin: Some(Service::SemanticScholar),
        secondary_id: Some(paper_id.to_string()),
        doi: doi.map(ToString::to_string),
        title: Some(title.to_string()),
        year: Some(2012),
        citation_count: citations,
        ..RawReference::default()
    }
}
