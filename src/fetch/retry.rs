//! Retry logic with exponential backoff for transient service failures.
//!
//! When a call fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - timeouts, connection drops, 5xx responses
//! - [`FailureType::RateLimited`] - HTTP 429, retried with backoff
//! - [`FailureType::Permanent`] - 4xx responses, undecodable bodies
//!
//! The [`RetryPolicy`] then decides whether to retry, computing the delay as
//!
//! ```text
//! delay = min(cap, base * 2^attempt) + uniform(0..=max_jitter)
//! ```
//!
//! where `attempt` is the zero-based index of the attempt that just failed.
//!
//! # Example
//!
//! ```
//! use citegraph_core::fetch::{FailureType, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! match policy.should_retry(FailureType::Transient, 0) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("retrying in {delay:?} (attempt {attempt})");
//!     }
//!     RetryDecision::DoNotRetry { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::FetchError;

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1500);

/// Default maximum delay cap.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default maximum jitter added to each delay.
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(500);

/// Largest exponent used before the cap takes over; avoids float overflow.
const MAX_EXPONENT: u32 = 30;

/// Classification of fetch failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    Transient,

    /// Failure that won't succeed regardless of retries.
    Permanent,

    /// Server rate limiting (HTTP 429).
    RateLimited,
}

/// Decision on whether to retry a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Zero-based index of the attempt about to be made.
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Bounded retry policy with capped exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    max_retries: u32,

    /// Backoff base (`attempt` 0 waits roughly this long).
    base_delay: Duration,

    /// Backoff cap applied before jitter.
    max_delay: Duration,

    /// Upper bound of the uniform jitter.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    #[must_use]
    pub fn new(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        max_jitter: Duration,
    ) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            max_jitter,
        }
    }

    /// Creates a policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Returns the configured retry budget.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts including the initial one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Determines whether to retry after `attempt` (zero-based) failed.
    #[instrument(level = "trace", skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_retries {
            debug!(attempt, max = self.max_retries, "retries exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        let delay = self.backoff(attempt) + self.jitter();
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Deterministic part of the delay: `min(cap, base * 2^attempt)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_f64.powi(i32::try_from(attempt.min(MAX_EXPONENT)).unwrap_or(30));
        let raw = self.base_delay.as_secs_f64() * factor;
        let capped = raw.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Uniform jitter in `0..=max_jitter`.
    fn jitter(&self) -> Duration {
        #[allow(clippy::cast_possible_truncation)]
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(0..=max_ms))
    }
}

/// Classifies a fetch error into a failure type for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Timeout | Transient |
/// | Network (most) | Transient |
/// | Network (TLS) | Permanent |
/// | HTTP 408, 5xx | Transient |
/// | HTTP 429 | RateLimited |
/// | other HTTP | Permanent |
/// | Decode, InvalidUrl | Permanent |
#[must_use]
pub fn classify_error(error: &FetchError) -> FailureType {
    match error {
        FetchError::HttpStatus { status, .. } => classify_http_status(*status),
        FetchError::Timeout { .. } => FailureType::Transient,
        FetchError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        FetchError::Decode { .. } | FetchError::InvalidUrl { .. } => FailureType::Permanent,
    }
}

#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        500..=599 => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}
