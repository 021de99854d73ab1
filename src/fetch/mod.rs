//! Rate-limited, retrying HTTP access to the bibliographic services.
//!
//! Every outbound request goes through [`FetchClient::get_json`], which
//! acquires a token from the per-service [`RateLimiter`], applies the
//! service's timeout, and retries transient failures per [`RetryPolicy`].
//! Each attempt is recorded in the shared metrics collector.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use citegraph_core::config::ServiceConfig;
//! use citegraph_core::fetch::{FetchClient, Service};
//! use citegraph_core::metrics::MetricsCollector;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(MetricsCollector::new());
//! let client = FetchClient::builder(None, metrics)
//!     .service(Service::OpenAlex, &ServiceConfig::openalex_default())
//!     .build()?;
//! let url = url::Url::parse("https://api.openalex.org/works/W2741809807")?;
//! let body: serde_json::Value = client.get_json(Service::OpenAlex, url).await?;
//! println!("{}", body["display_name"]);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use serde::Serialize;

mod client;
mod error;
pub mod rate_limiter;
mod retry;

pub use client::{FetchClient, FetchClientBuilder};
pub use error::FetchError;
pub use rate_limiter::{RateLimiter, parse_retry_after};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};

/// The external services the crawler talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Service {
    /// The primary catalog (canonical identities, citation counts).
    #[serde(rename = "openalex")]
    OpenAlex,
    /// The secondary reference service.
    #[serde(rename = "s2")]
    SemanticScholar,
}

impl Service {
    /// All services, in reporting order.
    pub const ALL: [Service; 2] = [Service::OpenAlex, Service::SemanticScholar];

    /// Short stable name used in logs, metrics, and node origin tags.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAlex => "openalex",
            Self::SemanticScholar => "s2",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
