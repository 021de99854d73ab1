//! The node/edge accumulator.
//!
//! Nodes live in an arena indexed by key; edges are keyed by
//! `(source, target)`. A node and its incoming edge are committed together
//! under one lock, so a cancelled crawl never exports an edge without its
//! node or a node without the edge that discovered it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::fetch::Service;
use crate::sources::{CatalogWork, RawReference};

/// Where a node's metadata came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[serde(rename = "openalex")]
    OpenAlex,
    #[serde(rename = "s2")]
    SemanticScholar,
    /// Catalog metadata reached through the secondary service's reference list.
    Mixed,
}

impl From<Service> for Origin {
    fn from(service: Service) -> Self {
        match service {
            Service::OpenAlex => Self::OpenAlex,
            Service::SemanticScholar => Self::SemanticScholar,
        }
    }
}

/// A node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Work {
    /// Canonical id, or a synthetic `S2:`/`S2-TITLE:` key for unmapped nodes.
    pub key: String,
    pub canonical_id: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    #[serde(rename = "type")]
    pub work_type: Option<String>,
    pub authors: Vec<String>,
    pub cited_by_count: Option<u64>,
    pub is_retracted: bool,
    pub origin: Origin,
    pub secondary_id: Option<String>,
    /// BFS depth at which the node was first discovered.
    pub depth: u32,
}

impl Work {
    /// Node for a resolved catalog work.
    #[must_use]
    pub fn from_catalog(work: &CatalogWork, origin: Origin, secondary_id: Option<String>, depth: u32) -> Self {
        Self {
            key: work.id.clone(),
            canonical_id: Some(work.id.clone()),
            doi: work.doi.clone(),
            title: work.title.clone(),
            year: work.year,
            venue: work.venue.clone(),
            work_type: work.work_type.clone(),
            authors: work.authors.clone(),
            cited_by_count: work.cited_by_count,
            is_retracted: work.is_retracted,
            origin,
            secondary_id,
            depth,
        }
    }

    /// Synthetic node for an unmapped reference; `None` if it has neither a
    /// secondary id nor a title to key on.
    #[must_use]
    pub fn synthetic(reference: &RawReference, depth: u32) -> Option<Self> {
        let key = match (&reference.secondary_id, &reference.title) {
            (Some(id), _) => format!("S2:{id}"),
            (None, Some(title)) => format!("S2-TITLE:{}", title.chars().take(80).collect::<String>()),
            (None, None) => return None,
        };
        Some(Self {
            key,
            canonical_id: None,
            doi: reference.doi.clone(),
            title: reference.title.clone(),
            year: reference.year,
            venue: reference.venue.clone(),
            work_type: None,
            authors: Vec::new(),
            cited_by_count: reference.citation_count,
            is_retracted: false,
            origin: reference.origin.map_or(Origin::SemanticScholar, Origin::from),
            secondary_id: reference.secondary_id.clone(),
            depth,
        })
    }

    /// Fills fields this node lacks from a rediscovery. Depth is never changed.
    fn fill_from(&mut self, other: Work) {
        self.canonical_id = self.canonical_id.take().or(other.canonical_id);
        self.doi = self.doi.take().or(other.doi);
        self.title = self.title.take().or(other.title);
        self.year = self.year.or(other.year);
        self.venue = self.venue.take().or(other.venue);
        self.work_type = self.work_type.take().or(other.work_type);
        if self.authors.is_empty() {
            self.authors = other.authors;
        }
        self.cited_by_count = self.cited_by_count.or(other.cited_by_count);
        self.is_retracted |= other.is_retracted;
        self.secondary_id = self.secondary_id.take().or(other.secondary_id);
        if self.origin != other.origin {
            self.origin = Origin::Mixed;
        }
    }
}

/// An edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub source: String,
    pub target: String,
    /// Layer in which this citing relationship was first found.
    pub depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_secondary_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_secondary_id: Option<String>,
}

/// Whether a commit created the target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCommit {
    /// First discovery; the caller owns the node's expansion.
    New,
    /// The node already existed; only the edge (if new) was added.
    Existing,
}

#[derive(Debug, Default)]
struct GraphInner {
    index: HashMap<String, usize>,
    nodes: Vec<Work>,
    edges: BTreeMap<(String, String), Citation>,
}

/// Thread-safe citation graph.
#[derive(Debug, Default)]
pub struct CitationGraph {
    inner: Mutex<GraphInner>,
}

/// Sorted, owned copy of the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Work>,
    pub edges: Vec<Citation>,
}

impl CitationGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GraphInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts the seed node (depth 0). Returns false if it already existed.
    pub fn insert_seed(&self, mut work: Work) -> bool {
        work.depth = 0;
        let mut inner = self.lock();
        if inner.index.contains_key(&work.key) {
            return false;
        }
        let slot = inner.nodes.len();
        inner.index.insert(work.key.clone(), slot);
        inner.nodes.push(work);
        true
    }

    /// Atomically adds `work` (or merges it into the existing node) and the
    /// edge `parent -> work`. Self-citations are ignored and return `None`.
    pub fn commit(&self, parent: &str, work: Work, depth: u32) -> Option<NodeCommit> {
        if work.key == parent {
            return None;
        }
        let mut guard = self.lock();
        let inner = &mut *guard;
        let target = work.key.clone();
        let target_secondary = work.secondary_id.clone();
        let source_secondary = inner
            .index
            .get(parent)
            .and_then(|&i| inner.nodes.get(i))
            .and_then(|n| n.secondary_id.clone());

        let commit = if let Some(&slot) = inner.index.get(&target) {
            if let Some(existing) = inner.nodes.get_mut(slot) {
                existing.fill_from(work);
            }
            NodeCommit::Existing
        } else {
            let slot = inner.nodes.len();
            inner.index.insert(target.clone(), slot);
            inner.nodes.push(Work { depth, ..work });
            NodeCommit::New
        };

        inner
            .edges
            .entry((parent.to_string(), target.clone()))
            .or_insert_with(|| Citation {
                source: parent.to_string(),
                target,
                depth,
                source_secondary_id: source_secondary,
                target_secondary_id: target_secondary,
            });
        Some(commit)
    }

    /// Adds the edge `parent -> key` if the node `key` already exists.
    ///
    /// Returns false (and adds nothing) when the node is unknown. Self-citations
    /// count as linked.
    pub fn link_existing(&self, parent: &str, key: &str, depth: u32) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(&slot) = inner.index.get(key) else {
            return false;
        };
        if key == parent {
            return true;
        }
        let target_secondary = inner.nodes.get(slot).and_then(|n| n.secondary_id.clone());
        let source_secondary = inner
            .index
            .get(parent)
            .and_then(|&i| inner.nodes.get(i))
            .and_then(|n| n.secondary_id.clone());
        inner
            .edges
            .entry((parent.to_string(), key.to_string()))
            .or_insert_with(|| Citation {
                source: parent.to_string(),
                target: key.to_string(),
                depth,
                source_secondary_id: source_secondary,
                target_secondary_id: target_secondary,
            });
        true
    }

    /// Returns true if a node with `key` exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().index.contains_key(key)
    }

    /// Clone of the node with `key`.
    #[must_use]
    pub fn node(&self, key: &str) -> Option<Work> {
        let inner = self.lock();
        inner.index.get(key).and_then(|&i| inner.nodes.get(i)).cloned()
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.lock().edges.len()
    }

    /// Nodes sorted by key and edges sorted by `(source, target)`.
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        let inner = self.lock();
        let mut nodes = inner.nodes.clone();
        nodes.sort_by(|a, b| a.key.cmp(&b.key));
        GraphSnapshot {
            nodes,
            edges: inner.edges.values().cloned().collect(),
        }
    }
}
