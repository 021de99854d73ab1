//! Error types for the fetch layer.
//!
//! Every outbound call to a bibliographic service ends in either a decoded
//! body or one of these errors. None of them is fatal to a crawl on its own;
//! the crawler treats an exhausted fetch as a miss for that single attempt.

use thiserror::Error;

use super::Service;

/// Errors that can occur while calling an external service.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error calling {service} at {url}: {source}")]
    Network {
        /// The service being called.
        service: Service,
        /// The request URL.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout calling {service} at {url}")]
    Timeout {
        /// The service being called.
        service: Service,
        /// The request URL.
        url: String,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status} from {service} at {url}")]
    HttpStatus {
        /// The service being called.
        service: Service,
        /// The request URL.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// The response body was not the JSON shape we expected.
    #[error("undecodable response from {service} at {url}: {reason}")]
    Decode {
        /// The service being called.
        service: Service,
        /// The request URL.
        url: String,
        /// Decoder message.
        reason: String,
    },

    /// The request URL could not be built.
    #[error("invalid request URL for {service}: {url}")]
    InvalidUrl {
        /// The service being called.
        service: Service,
        /// The offending URL text.
        url: String,
    },
}

impl FetchError {
    /// Creates a network error, folding reqwest timeouts into [`FetchError::Timeout`].
    pub fn network(service: Service, url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { service, url }
        } else {
            Self::Network {
                service,
                url,
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(service: Service, url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            service,
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error carrying a Retry-After header value.
    pub fn http_status_with_retry_after(
        service: Service,
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            service,
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(service: Service, url: impl Into<String>) -> Self {
        Self::Timeout {
            service,
            url: url.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(service: Service, url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            service,
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(service: Service, url: impl Into<String>) -> Self {
        Self::InvalidUrl {
            service,
            url: url.into(),
        }
    }

    /// Returns the service the failed call was addressed to.
    #[must_use]
    pub fn service(&self) -> Service {
        match self {
            Self::Network { service, .. }
            | Self::Timeout { service, .. }
            | Self::HttpStatus { service, .. }
            | Self::Decode { service, .. }
            | Self::InvalidUrl { service, .. } => *service,
        }
    }

    /// Short, stable error class used in logs and metrics.
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Timeout { .. } => "timeout",
            Self::HttpStatus { status: 429, .. } => "rate_limited",
            Self::HttpStatus { status, .. } if *status >= 500 => "server_error",
            Self::HttpStatus { .. } => "client_error",
            Self::Decode { .. } => "decode",
            Self::InvalidUrl { .. } => "invalid_url",
        }
    }

    /// Returns true for a 404, which lookups treat as a definitive miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 404, .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_http_status_message() {
        let err = FetchError::http_status(Service::OpenAlex, "https://api.openalex.org/works/W1", 503);
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("openalex"));
        assert_eq!(err.class(), "server_error");
        assert_eq!(err.service(), Service::OpenAlex);
    }

    #[test]
    fn test_fetch_error_classes() {
        assert_eq!(
            FetchError::http_status(Service::SemanticScholar, "u", 429).class(),
            "rate_limited"
        );
        assert_eq!(
            FetchError::http_status(Service::SemanticScholar, "u", 404).class(),
            "client_error"
        );
        assert_eq!(FetchError::timeout(Service::OpenAlex, "u").class(), "timeout");
        assert_eq!(
            FetchError::decode(Service::OpenAlex, "u", "eof").class(),
            "decode"
        );
        assert_eq!(
            FetchError::invalid_url(Service::OpenAlex, "::").class(),
            "invalid_url"
        );
    }

    #[test]
    fn test_fetch_error_not_found() {
        assert!(FetchError::http_status(Service::OpenAlex, "u", 404).is_not_found());
        assert!(!FetchError::http_status(Service::OpenAlex, "u", 410).is_not_found());
    }

    #[test]
    fn test_fetch_error_retry_after_preserved() {
        let err = FetchError::http_status_with_retry_after(
            Service::OpenAlex,
            "u",
            429,
            Some("7".to_string()),
        );
        match err {
            FetchError::HttpStatus { retry_after, .. } => {
                assert_eq!(retry_after.as_deref(), Some("7"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
