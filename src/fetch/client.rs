//! HTTP client wrapper that applies rate limiting, timeouts, and retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use url::Url;

use super::rate_limiter::{RateLimiter, parse_retry_after};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use super::{FetchError, Service};
use crate::config::ServiceConfig;
use crate::metrics::MetricsCollector;
use crate::user_agent::polite_user_agent;

/// Connect timeout ceiling; the per-service timeout bounds the whole request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One service's transport: its HTTP client and retry policy.
#[derive(Debug, Clone)]
struct ServiceTransport {
    http: Client,
    policy: RetryPolicy,
}

/// Shared fetch client for every external service.
///
/// Cheap to share behind an `Arc`; the underlying `reqwest::Client`s pool
/// connections internally.
#[derive(Debug)]
pub struct FetchClient {
    transports: HashMap<Service, ServiceTransport>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
}

/// Builder for [`FetchClient`].
///
/// Services that are not configured explicitly receive their defaults.
#[derive(Debug)]
pub struct FetchClientBuilder {
    user_agent: String,
    metrics: Arc<MetricsCollector>,
    services: HashMap<Service, ServiceConfig>,
    rate_limited: bool,
}

impl FetchClientBuilder {
    /// Sets the transport settings for `service`.
    #[must_use]
    pub fn service(mut self, service: Service, config: &ServiceConfig) -> Self {
        self.services.insert(service, config.clone());
        self
    }

    /// Disables token-bucket limiting (tests against local mock servers).
    #[must_use]
    pub fn without_rate_limit(mut self) -> Self {
        self.rate_limited = false;
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if an HTTP client cannot be constructed.
    pub fn build(self) -> Result<FetchClient, FetchError> {
        let mut limiter = RateLimiter::new();
        let mut transports = HashMap::new();

        for service in Service::ALL {
            let config = self
                .services
                .get(&service)
                .cloned()
                .unwrap_or_else(|| ServiceConfig::default_for(service));

            let http = Client::builder()
                .connect_timeout(CONNECT_TIMEOUT.min(config.timeout))
                .timeout(config.timeout)
                .user_agent(self.user_agent.clone())
                .gzip(true)
                .build()
                .map_err(|e| FetchError::network(service, "<client construction>", e))?;

            if self.rate_limited {
                limiter = limiter.with_bucket(service, config.qps, config.burst);
            }
            transports.insert(
                service,
                ServiceTransport {
                    http,
                    policy: config.retry_policy(),
                },
            );
        }

        Ok(FetchClient {
            transports,
            limiter: Arc::new(limiter),
            metrics: self.metrics,
        })
    }
}

impl FetchClient {
    /// Starts building a client that identifies itself with `contact`.
    #[must_use]
    pub fn builder(contact: Option<&str>, metrics: Arc<MetricsCollector>) -> FetchClientBuilder {
        FetchClientBuilder {
            user_agent: polite_user_agent(contact),
            metrics,
            services: HashMap::new(),
            rate_limited: true,
        }
    }

    /// The metrics sink every attempt is recorded into.
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// GETs `url` from `service` and decodes the JSON body.
    ///
    /// Each attempt waits for a rate-limit token, is bounded by the service
    /// timeout, and is recorded in the metrics. Transient failures (timeouts,
    /// 408, 429, 5xx) are retried with capped exponential back-off plus
    /// jitter; on 429 a Retry-After hint extends the delay.
    ///
    /// # Errors
    ///
    /// Returns the last [`FetchError`] once retries are exhausted, or the first
    /// permanent one.
    #[instrument(skip(self), fields(%service, url = %url))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        service: Service,
        url: Url,
    ) -> Result<T, FetchError> {
        let Some(transport) = self.transports.get(&service) else {
            return Err(FetchError::invalid_url(service, url.as_str()));
        };

        let mut attempt = 0u32;
        loop {
            self.limiter.acquire(service).await;

            let started = Instant::now();
            let result = send_once::<T>(&transport.http, service, &url).await;
            let latency = started.elapsed();
            self.metrics.record_call(service, latency, result.is_ok());

            let error = match result {
                Ok(body) => {
                    debug!(latency_ms = latency.as_millis(), "request succeeded");
                    return Ok(body);
                }
                Err(error) => error,
            };

            let failure_type = classify_error(&error);
            let server_hint = if failure_type == FailureType::RateLimited {
                self.retry_after_hint(&error).await
            } else {
                None
            };

            match transport.policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay: backoff,
                    attempt: next_attempt,
                } => {
                    let delay = server_hint.map_or(backoff, |hint| hint.max(backoff));
                    info!(
                        %service,
                        attempt = next_attempt,
                        max_attempts = transport.policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        using_retry_after = server_hint.is_some(),
                        error = %error,
                        "backing off before retry"
                    );
                    self.metrics.record_retry(service);
                    tokio::time::sleep(delay).await;
                    attempt = next_attempt;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%service, %reason, error_class = error.class(), "giving up on request");
                    return Err(error);
                }
            }
        }
    }

    /// Parses a 429's Retry-After header and drains the service bucket accordingly.
    async fn retry_after_hint(&self, error: &FetchError) -> Option<Duration> {
        let FetchError::HttpStatus {
            service,
            retry_after: Some(header),
            ..
        } = error
        else {
            return None;
        };
        let delay = parse_retry_after(header)?;
        self.limiter.record_rate_limit(*service, delay).await;
        Some(delay)
    }
}

async fn send_once<T: DeserializeOwned>(
    http: &Client,
    service: Service,
    url: &Url,
) -> Result<T, FetchError> {
    let response = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::network(service, url.as_str(), e))?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        return Err(FetchError::http_status_with_retry_after(
            service,
            url.as_str(),
            status.as_u16(),
            retry_after,
        ));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::network(service, url.as_str(), e))?;
    serde_json::from_slice(&body).map_err(|e| FetchError::decode(service, url.as_str(), e.to_string()))
}
