//! Writes the run's graph and metrics documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use tracing::info;

use crate::crawl::CrawlOutcome;
use crate::error::CrawlError;
use crate::graph::{Citation, Work};
use crate::metrics::MetricsReport;

/// File name of the graph document.
pub const GRAPH_FILE: &str = "graph.json";

/// File name of the metrics document.
pub const METRICS_FILE: &str = "metrics.json";

/// Run metadata carried in the graph document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunMetadata {
    /// The seed string as given.
    pub seed: String,
    /// Canonical id the seed resolved to.
    pub seed_id: String,
    pub max_depth: u32,
    pub layers_completed: u32,
    /// RFC 7231 date.
    pub generated_at: String,
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// The full graph document.
#[derive(Debug, Serialize)]
pub struct GraphDocument<'a> {
    pub metadata: RunMetadata,
    pub nodes: &'a [Work],
    pub edges: &'a [Citation],
}

impl<'a> GraphDocument<'a> {
    /// Document for `outcome`, stamped with `generated_at`.
    #[must_use]
    pub fn new(outcome: &'a CrawlOutcome, generated_at: SystemTime) -> Self {
        Self {
            metadata: RunMetadata {
                seed: outcome.seed_input.clone(),
                seed_id: outcome.seed_key.clone(),
                max_depth: outcome.max_depth,
                layers_completed: outcome.layers_completed,
                generated_at: httpdate::fmt_http_date(generated_at),
                complete: outcome.complete,
                failure: outcome.failure.clone(),
            },
            nodes: &outcome.graph.nodes,
            edges: &outcome.graph.edges,
        }
    }
}

/// Writes `graph.json` into `dir`, creating it if needed.
///
/// # Errors
///
/// Returns [`CrawlError::Export`] or [`CrawlError::Serialize`].
pub fn write_graph(dir: &Path, outcome: &CrawlOutcome) -> Result<PathBuf, CrawlError> {
    let document = GraphDocument::new(outcome, SystemTime::now());
    let path = write_json(dir, GRAPH_FILE, "graph document", &document)?;
    info!(
        path = %path.display(),
        nodes = document.nodes.len(),
        edges = document.edges.len(),
        "graph written"
    );
    Ok(path)
}

/// Writes `metrics.json` into `dir`, creating it if needed.
///
/// # Errors
///
/// Returns [`CrawlError::Export`] or [`CrawlError::Serialize`].
pub fn write_metrics(dir: &Path, report: &MetricsReport) -> Result<PathBuf, CrawlError> {
    let path = write_json(dir, METRICS_FILE, "metrics report", report)?;
    info!(path = %path.display(), "metrics written");
    Ok(path)
}

fn write_json<T: Serialize + ?Sized>(
    dir: &Path,
    file: &str,
    what: &'static str,
    value: &T,
) -> Result<PathBuf, CrawlError> {
    fs::create_dir_all(dir).map_err(|source| CrawlError::Export {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut body = serde_json::to_vec_pretty(value).map_err(|source| CrawlError::Serialize { what, source })?;
    body.push(b'\n');
    let path = dir.join(file);
    fs::write(&path, body).map_err(|source| CrawlError::Export {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::crawl::CrawlState;
    use crate::graph::{CitationGraph, Origin};
    use crate::metrics::MetricsCollector;
    use crate::sources::CatalogWork;

    fn outcome() -> CrawlOutcome {
        let graph = CitationGraph::new();
        let node = |id: &str| {
            Work::from_catalog(
                &CatalogWork {
                    id: id.to_string(),
                    cited_by_count: Some(5),
                    ..CatalogWork::default()
                },
                Origin::OpenAlex,
                None,
                0,
            )
        };
        graph.insert_seed(node("W100"));
        graph.commit("W100", node("W1"), 1);
        CrawlOutcome {
            seed_input: "W100".into(),
            seed_key: "W100".into(),
            max_depth: 1,
            layers_completed: 1,
            complete: true,
            failure: None,
            final_state: CrawlState::Done,
            graph: graph.snapshot(),
        }
    }

    #[test]
    fn test_graph_document_shape() {
        let outcome = outcome();
        let document = GraphDocument::new(&outcome, UNIX_EPOCH + Duration::from_secs(784_111_777));
        let json = serde_json::to_value(&document).unwrap();

        assert_eq!(json["metadata"]["seed_id"], "W100");
        assert_eq!(json["metadata"]["generated_at"], "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(json["metadata"]["complete"], true);
        assert!(json["metadata"].get("failure").is_none());
        assert_eq!(json["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(json["edges"][0]["source"], "W100");
        assert_eq!(json["edges"][0]["target"], "W1");
        assert_eq!(json["nodes"][0]["type"], serde_json::Value::Null);
    }

    #[test]
    fn test_write_graph_creates_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("out");
        let path = write_graph(&dir, &outcome()).unwrap();
        assert_eq!(path, dir.join(GRAPH_FILE));

        let written: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["metadata"]["layers_completed"], 1);
    }

    #[test]
    fn test_write_metrics() {
        let temp = tempfile::tempdir().unwrap();
        let report = MetricsCollector::new().report();
        let path = write_metrics(temp.path(), &report).unwrap();
        let written: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert!(written["services"].is_object());
    }

    #[test]
    fn test_unwritable_directory_is_export_error() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let err = write_graph(&blocker.join("sub"), &outcome()).unwrap_err();
        assert!(err.is_export_failure());
    }
}
