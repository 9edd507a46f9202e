//! Failure policies for each kind of crawl operation.
//!
//! Every operation that can fail without failing the run declares here how
//! often it is retried and what value it falls back to. Call sites only ask
//! [`FailurePolicy::retry_delay`] whether to try again and hand the final
//! error to [`FailurePolicy::fall_back`].
//!
//! | Operation | Retries | Fallback |
//! |-----------|---------|----------|
//! | [`Operation::Discovery`] | `retry.discovery_retries` (transient only) | treat node as a leaf |
//! | [`Operation::Classify`] | none | treat article as free |
//! | [`Operation::Detect`] | none | no new articles this run |
//! | [`Operation::Tier`] | none | try the next bypass tier |
//!
//! # Backoff Strategy
//!
//! ```text
//! delay = min(base_delay * 2^attempt, max_delay) + random_jitter(0..=jitter)
//! ```

use rand::{Rng, rng};
use std::fmt;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::FetchError;

/// Kinds of operation with declared failure semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Checking a section page for child subsections.
    Discovery,
    /// Checking an article page for the paywall marker.
    Classify,
    /// Listing a leaf section's article stream.
    Detect,
    /// Fetching through one paywall bypass tier.
    Tier,
}

impl Operation {
    /// What the caller does once the operation has finally failed.
    pub fn fallback(self) -> &'static str {
        match self {
            Operation::Discovery => "treating section as leaf",
            Operation::Classify => "treating article as free",
            Operation::Detect => "reporting no new articles",
            Operation::Tier => "trying next tier",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Discovery => "discovery",
            Operation::Classify => "classify",
            Operation::Detect => "detect",
            Operation::Tier => "tier",
        };
        f.write_str(name)
    }
}

/// Retry and fallback behaviour of one [`Operation`].
#[derive(Debug, Clone)]
pub struct FailurePolicy {
    pub operation: Operation,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter_ms: u64,
}

impl FailurePolicy {
    /// The policy for `operation` under the configured backoff.
    pub fn for_operation(operation: Operation, retry: &RetryConfig) -> Self {
        let max_retries = match operation {
            Operation::Discovery => retry.discovery_retries,
            Operation::Classify | Operation::Detect | Operation::Tier => 0,
        };
        Self {
            operation,
            max_retries,
            base_delay: Duration::from_millis(retry.base_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
            jitter_ms: retry.jitter_ms,
        }
    }

    /// Delay before retry number `attempt + 1`, or `None` once retries are
    /// exhausted or the error is not worth retrying.
    pub fn retry_delay(&self, attempt: usize, err: &FetchError) -> Option<Duration> {
        if attempt >= self.max_retries || !err.is_transient() {
            return None;
        }
        let shift = attempt.min(16) as u32;
        let delay = self
            .base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay);
        let jitter = if self.jitter_ms > 0 {
            rng().random_range(0..=self.jitter_ms)
        } else {
            0
        };
        Some(delay + Duration::from_millis(jitter))
    }

    /// Log a retry that is about to happen.
    pub fn note_retry(&self, url: &str, attempt: usize, delay: Duration, err: &FetchError) {
        warn!(
            operation = %self.operation,
            %url,
            attempt = attempt + 1,
            max = self.max_retries,
            ?delay,
            error = %err,
            "Attempt failed; backing off"
        );
    }

    /// Log the final failure and return the declared fallback value.
    pub fn fall_back<T>(&self, url: &str, err: &FetchError, fallback: T) -> T {
        warn!(
            operation = %self.operation,
            %url,
            error = %err,
            "{}",
            self.operation.fallback()
        );
        fallback
    }

    /// Unwrap `result`, falling back on error.
    pub fn resolve<T>(&self, url: &str, result: Result<T, FetchError>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(e) => self.fall_back(url, &e, fallback),
        }
    }
}
