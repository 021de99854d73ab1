//! HTTP behaviour of the fetch client and both service clients against wiremock.

mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use citegraph_core::{
    Catalog, FetchClient, FetchError, MetricsCollector, OpenAlexCatalog, PaperLookup, ReferenceSource,
    SemanticScholarSource, Service, ServiceConfig,
};
use support::socket_guard::start_mock_server_or_skip;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn fast_config(retries: u32) -> ServiceConfig {
    ServiceConfig {
        qps: 100.0,
        burst: 10,
        timeout: Duration::from_secs(5),
        max_retries: retries,
        backoff_base: Duration::from_millis(10),
        backoff_cap: Duration::from_millis(50),
        max_jitter: Duration::ZERO,
    }
}

fn client(retries: u32) -> (Arc<FetchClient>, Arc<MetricsCollector>) {
    let metrics = Arc::new(MetricsCollector::new());
    let client = FetchClient::builder(Some("tests@example.org"), Arc::clone(&metrics))
        .service(Service::OpenAlex, &fast_config(retries))
        .service(Service::SemanticScholar, &fast_config(retries))
        .without_rate_limit()
        .build()
        .unwrap();
    (Arc::new(client), metrics)
}

fn openalex_work(id: &str, doi: &str) -> serde_json::Value {
    serde_json::json!({
        "id": format!("https://openalex.org/{id}"),
        "doi": format!("https://doi.org/{doi}"),
        "title": "Observation of Gravitational Waves from a Binary Black Hole Merger",
        "publication_year": 2016,
        "type": "article",
        "cited_by_count": 12000,
        "is_retracted": false,
        "authorships": [{"author": {"display_name": "B. P. Abbott"}}],
        "primary_location": {"source": {"display_name": "Physical Review Letters"}},
        "referenced_works": ["https://openalex.org/W1", "https://openalex.org/W2"]
    })
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&server)
        .await;

    let (client, metrics) = client(3);
    let url = Url::parse(&format!("{}/flaky", server.uri())).unwrap();
    let body: serde_json::Value = client.get_json(Service::OpenAlex, url).await.unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(metrics.ok_count(Service::OpenAlex), 1);
    assert_eq!(metrics.err_count(Service::OpenAlex), 2);
    assert_eq!(metrics.report().services[&Service::OpenAlex].retries, 2);
}

#[tokio::test]
async fn test_retries_exhausted_returns_last_error() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let (client, _) = client(2);
    let url = Url::parse(&format!("{}/down", server.uri())).unwrap();
    let err = client
        .get_json::<serde_json::Value>(Service::SemanticScholar, url)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::HttpStatus { status: 500, .. }));
    assert_eq!(err.service(), Service::SemanticScholar);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let (client, metrics) = client(3);
    let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
    let err = client
        .get_json::<serde_json::Value>(Service::OpenAlex, url)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(metrics.err_count(Service::OpenAlex), 1);
}

#[tokio::test]
async fn test_rate_limited_response_honours_retry_after() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let (client, _) = client(3);
    let url = Url::parse(&format!("{}/busy", server.uri())).unwrap();
    let started = Instant::now();
    let _: serde_json::Value = client.get_json(Service::OpenAlex, url).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(950));
}

#[tokio::test]
async fn test_undecodable_body_is_permanent() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client(3);
    let url = Url::parse(&format!("{}/garbage", server.uri())).unwrap();
    let err = client
        .get_json::<serde_json::Value>(Service::OpenAlex, url)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Decode { .. }));
}

#[tokio::test]
async fn test_openalex_get_work_sends_mailto() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/works/W2741809807"))
        .and(query_param("mailto", "tests@example.org"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(openalex_work("W2741809807", "10.1103/PhysRevLett.116.061102")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client(0);
    let catalog = OpenAlexCatalog::with_base_url(client, Some("tests@example.org".into()), server.uri());
    let work = catalog.get_work("W2741809807").await.unwrap().unwrap();

    assert_eq!(work.id, "W2741809807");
    assert_eq!(work.doi.as_deref(), Some("10.1103/physrevlett.116.061102"));
    assert_eq!(work.venue.as_deref(), Some("Physical Review Letters"));
    assert_eq!(work.authors, vec!["B. P. Abbott"]);
    assert_eq!(work.referenced_works, vec!["W1", "W2"]);
}

#[tokio::test]
async fn test_openalex_missing_work_is_none() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/works/W404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (client, _) = client(0);
    let catalog = OpenAlexCatalog::with_base_url(client, None, server.uri());
    assert!(catalog.get_work("W404").await.unwrap().is_none());
}

#[tokio::test]
async fn test_openalex_doi_filter_and_search() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(query_param("filter", "doi:10.1/abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"results": [openalex_work("W7", "10.1/abc")]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(query_param("search", "binary black hole"))
        .and(query_param("filter", "publication_year:2016"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = client(0);
    let catalog = OpenAlexCatalog::with_base_url(client, None, server.uri());
    let hit = catalog.find_by_doi("10.1/abc").await.unwrap().unwrap();
    assert_eq!(hit.id, "W7");
    assert!(catalog.search("binary black hole", Some(2016)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_semantic_scholar_reference_list() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/paper/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "references": [
                {
                    "paperId": "r1",
                    "title": "Anti-de Sitter space and holography",
                    "year": 1998,
                    "externalIds": {"ArXiv": "hep-th/9802150"},
                    "citationCount": 15000,
                    "venue": ""
                },
                {"paperId": null, "title": "Phys. Rev. D", "externalIds": {"CorpusId": 7}}
            ]
        })))
        .mount(&server)
        .await;

    let (client, _) = client(0);
    let source = SemanticScholarSource::with_base_url(client, server.uri());
    let references = source.fetch_references("abc123").await.unwrap();

    assert_eq!(references.len(), 2);
    assert_eq!(references[0].secondary_id.as_deref(), Some("r1"));
    assert_eq!(references[0].arxiv_id.as_deref(), Some("hep-th/9802150"));
    assert_eq!(references[0].venue, None);
    assert_eq!(references[1].secondary_id.as_deref(), Some("CorpusId:7"));
}

#[tokio::test]
async fn test_semantic_scholar_find_paper_by_doi_and_title() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/paper/DOI:10.1/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "paperId": "p1",
            "externalIds": {"DOI": "10.1/ABC"},
            "title": "A paper",
            "year": 2020,
            "citationCount": 3
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/paper/search"))
        .and(query_param("query", "holography"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"paperId": "low", "title": "Holography notes", "year": 2001, "citationCount": 4},
                {"paperId": "high", "title": "Holography", "year": 1998, "citationCount": 900}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/paper/unknown"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (client, _) = client(0);
    let source = SemanticScholarSource::with_base_url(client, server.uri());

    let by_doi = source.find_paper(PaperLookup::Doi("10.1/abc")).await.unwrap().unwrap();
    assert_eq!(by_doi.paper_id, "p1");
    assert_eq!(by_doi.doi.as_deref(), Some("10.1/abc"));

    let by_title = source.find_paper(PaperLookup::Title("holography")).await.unwrap().unwrap();
    assert_eq!(by_title.paper_id, "high");

    assert!(source.find_paper(PaperLookup::Id("unknown")).await.unwrap().is_none());
}
