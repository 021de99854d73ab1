//! Per-service token-bucket rate limiting for outbound requests.
//!
//! Each external service owns a bucket with a burst capacity and a continuous
//! refill rate. [`RateLimiter::acquire`] withdraws one token; when the bucket is
//! empty the caller reserves the next token and sleeps until it has refilled.
//! Only the calling task is suspended; the bucket lock is never held across
//! the sleep.
//!
//! # Example
//!
//! ```
//! use citegraph_core::fetch::{RateLimiter, Service};
//!
//! # async fn example() {
//! let limiter = RateLimiter::new().with_bucket(Service::OpenAlex, 3.0, 3);
//!
//! // First three requests proceed immediately (burst), the fourth waits ~333ms.
//! for _ in 0..4 {
//!     limiter.acquire(Service::OpenAlex).await;
//! }
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::Service;

/// Warning threshold for cumulative delay per service.
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Per-service rate limiter.
///
/// Designed to be wrapped in `Arc` and shared by every crawl task. Services
/// without a configured bucket are not limited.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<Service, Arc<TokenBucket>>,
}

/// A single service's bucket.
#[derive(Debug)]
struct TokenBucket {
    /// Maximum stored tokens (burst size).
    capacity: f64,

    /// Tokens added per second.
    refill_per_sec: f64,

    /// Token count and last refill instant, mutated only under the lock.
    /// The count goes negative while callers hold reservations.
    state: Mutex<BucketState>,

    /// Total time callers spent waiting, in milliseconds.
    cumulative_delay_ms: AtomicU64,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(refill_per_sec: f64, capacity: u32) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }

    /// Withdraws a token, returning how long the caller must wait for it.
    async fn reserve(&self) -> Duration {
        let mut state = self.state.lock().await;
        self.refill(&mut state, Instant::now());
        state.tokens -= 1.0;
        if state.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-state.tokens / self.refill_per_sec)
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(total)
    }
}

impl RateLimiter {
    /// Creates a limiter with no buckets (every service unlimited).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the bucket for `service`.
    ///
    /// `qps` is the sustained refill rate; `burst` the bucket capacity.
    /// A non-positive or non-finite `qps` leaves the service unlimited.
    #[must_use]
    #[instrument(skip(self))]
    pub fn with_bucket(self, service: Service, qps: f64, burst: u32) -> Self {
        if qps.is_finite() && qps > 0.0 {
            debug!("configuring token bucket");
            self.buckets
                .insert(service, Arc::new(TokenBucket::new(qps, burst)));
        } else {
            debug!("rate limiting disabled for service");
        }
        self
    }

    /// Returns true if `service` has a bucket.
    #[must_use]
    pub fn is_limited(&self, service: Service) -> bool {
        self.buckets.contains_key(&service)
    }

    /// Waits until a token for `service` is available and withdraws it.
    #[instrument(level = "trace", skip(self))]
    pub async fn acquire(&self, service: Service) {
        // Clone the Arc so the DashMap shard lock is released before awaiting.
        let Some(bucket) = self.buckets.get(&service).map(|b| Arc::clone(b.value())) else {
            return;
        };

        let delay = bucket.reserve().await;
        if delay.is_zero() {
            return;
        }

        let cumulative = bucket.add_cumulative_delay(delay);
        debug!(
            %service,
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            "waiting for rate-limit token"
        );
        if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD
            && cumulative.saturating_sub(delay) < CUMULATIVE_DELAY_WARNING_THRESHOLD
        {
            warn!(
                %service,
                cumulative_delay_secs = cumulative.as_secs(),
                "excessive rate limiting - consider lowering worker count or raising QPS"
            );
        }
        tokio::time::sleep(delay).await;
    }

    /// Records a server-mandated pause (from a Retry-After header).
    ///
    /// The bucket is driven into debt so that no caller is admitted for
    /// roughly `delay`.
    #[instrument(skip(self))]
    pub async fn record_rate_limit(&self, service: Service, delay: Duration) {
        let Some(bucket) = self.buckets.get(&service).map(|b| Arc::clone(b.value())) else {
            return;
        };
        let mut state = bucket.state.lock().await;
        bucket.refill(&mut state, Instant::now());
        let debt = -(delay.as_secs_f64() * bucket.refill_per_sec);
        if debt < state.tokens {
            state.tokens = debt;
        }
        debug!(%service, delay_ms = delay.as_millis(), "recorded server rate limit");
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports integer seconds and HTTP-dates (RFC 7231). Returns `None` when
/// unparseable; caps values at one hour.
///
/// ```
/// use std::time::Duration;
/// use citegraph_core::fetch::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        return Some(duration.min(MAX_RETRY_AFTER));
    }

    let datetime = httpdate::parse_http_date(header_value).ok()?;
    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
        Err(_) => Some(Duration::ZERO),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test]
    async fn test_unconfigured_service_not_limited() {
        tokio::time::pause();
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..50 {
            limiter.acquire(Service::OpenAlex).await;
        }
        assert!(start.elapsed() < Duration::from_millis(1));
        assert!(!limiter.is_limited(Service::OpenAlex));
    }

    #[tokio::test]
    async fn test_zero_qps_means_unlimited() {
        let limiter = RateLimiter::new().with_bucket(Service::OpenAlex, 0.0, 5);
        assert!(!limiter.is_limited(Service::OpenAlex));
    }

    #[tokio::test]
    async fn test_burst_admitted_immediately() {
        tokio::time::pause();
        let limiter = RateLimiter::new().with_bucket(Service::OpenAlex, 2.0, 4);
        let start = Instant::now();
        for _ in 0..4 {
            limiter.acquire(Service::OpenAlex).await;
        }
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_sustained_rate_after_burst() {
        tokio::time::pause();
        let limiter = RateLimiter::new().with_bucket(Service::OpenAlex, 2.0, 1);
        let start = Instant::now();

        limiter.acquire(Service::OpenAlex).await;
        assert!(start.elapsed() < Duration::from_millis(1));

        limiter.acquire(Service::OpenAlex).await;
        assert!(start.elapsed() >= Duration::from_millis(499));

        limiter.acquire(Service::OpenAlex).await;
        assert!(start.elapsed() >= Duration::from_millis(999));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test]
    async fn test_services_are_independent() {
        tokio::time::pause();
        let limiter = RateLimiter::new()
            .with_bucket(Service::OpenAlex, 1.0, 1)
            .with_bucket(Service::SemanticScholar, 1.0, 1);

        limiter.acquire(Service::OpenAlex).await;
        let start = Instant::now();
        limiter.acquire(Service::SemanticScholar).await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_tokens_refill_after_idle() {
        tokio::time::pause();
        let limiter = RateLimiter::new().with_bucket(Service::OpenAlex, 1.0, 3);
        for _ in 0..3 {
            limiter.acquire(Service::OpenAlex).await;
        }
        tokio::time::advance(Duration::from_secs(10)).await;

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire(Service::OpenAlex).await;
        }
        // Capacity caps the refill, so only three are free.
        assert!(start.elapsed() < Duration::from_millis(1));
        limiter.acquire(Service::OpenAlex).await;
        assert!(start.elapsed() >= Duration::from_millis(999));
    }

    #[tokio::test]
    async fn test_record_rate_limit_pauses_admission() {
        tokio::time::pause();
        let limiter = RateLimiter::new().with_bucket(Service::SemanticScholar, 1.0, 5);
        limiter
            .record_rate_limit(Service::SemanticScholar, Duration::from_secs(4))
            .await;
        let start = Instant::now();
        limiter.acquire(Service::SemanticScholar).await;
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_concurrent_acquires_respect_rate() {
        tokio::time::pause();
        let limiter = Arc::new(RateLimiter::new().with_bucket(Service::OpenAlex, 10.0, 2));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire(Service::OpenAlex).await;
                Instant::now()
            }));
        }
        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap());
        }
        let last = admitted.iter().max().unwrap();
        // 2 free + 10 refills at 100ms each.
        assert!(last.duration_since(start) >= Duration::from_millis(999));
    }

    /// Admissions within `window` of a simultaneous burst of acquirers.
    async fn admitted_within(qps: f64, burst: u32, window: Duration) -> usize {
        let limiter = Arc::new(RateLimiter::new().with_bucket(Service::OpenAlex, qps, burst));
        let admitted = Arc::new(AtomicUsize::new(0));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let callers = 4 * ((qps * window.as_secs_f64()) as usize + burst as usize) + 10;

        let mut handles = Vec::new();
        for _ in 0..callers {
            let limiter = Arc::clone(&limiter);
            let admitted = Arc::clone(&admitted);
            handles.push(tokio::spawn(async move {
                limiter.acquire(Service::OpenAlex).await;
                admitted.fetch_add(1, Ordering::SeqCst);
            }));
        }
        tokio::time::sleep(window).await;
        let count = admitted.load(Ordering::SeqCst);
        for handle in handles {
            handle.abort();
        }
        count
    }

    #[tokio::test]
    async fn test_burst_admissions_bounded_by_rate_times_window() {
        tokio::time::pause();
        let cases = [
            (10.0, 2, Duration::from_secs(1)),
            (2.0, 5, Duration::from_secs(3)),
            (0.5, 1, Duration::from_secs(10)),
            (3.0, 1, Duration::from_millis(1500)),
        ];
        for (qps, burst, window) in cases {
            let admitted = admitted_within(qps, burst, window).await;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let bound = (qps * window.as_secs_f64()).floor() as usize + burst as usize;
            assert!(
                admitted <= bound,
                "qps={qps} burst={burst} window={window:?}: admitted {admitted} > {bound}"
            );
            assert!(
                admitted + 1 >= bound,
                "qps={qps} burst={burst} window={window:?}: admitted only {admitted} of {bound}"
            );
        }
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after("  3 "), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_parse_retry_after_rejects_garbage() {
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("7200"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_parse_retry_after_http_date_past() {
        assert_eq!(
            parse_retry_after("Wed, 01 Jan 2020 00:00:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_retry_after_http_date_future() {
        let future = std::time::SystemTime::now() + Duration::from_secs(60);
        let parsed = parse_retry_after(&httpdate::fmt_http_date(future)).unwrap();
        assert!(parsed >= Duration::from_secs(55) && parsed <= Duration::from_secs(61));
    }
}
