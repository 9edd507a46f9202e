//! Error types for page fetching and article storage.
//!
//! Per-task failures never escape a worker: the swarm turns every
//! [`FetchError`] and [`StoreError`] into a recorded task outcome. Only the
//! binary edge in `main` deals in `Box<dyn Error>`.

use std::time::Duration;
use thiserror::Error;

/// Result alias for anything that talks to a page session.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Failures raised while navigating, waiting on, or reading a page.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be made or the server answered with an error.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// A navigation or wait did not complete within its bound.
    #[error("timed out after {after:?} waiting on {url}")]
    Timeout { url: String, after: Duration },

    /// The page loaded but the expected element never appeared.
    #[error("element `{selector}` not found on {url}")]
    ElementNotFound { selector: String, url: String },

    /// A configured CSS selector failed to parse.
    #[error("invalid selector: {0}")]
    Selector(String),

    /// Page content was present but could not be interpreted.
    #[error("parse error: {0}")]
    Parse(String),

    /// Both paywall bypass tiers failed for an article.
    #[error("all bypass tiers exhausted for {url} (bypass: {primary}; archive: {secondary})")]
    AllTiersExhausted {
        url: String,
        primary: Box<FetchError>,
        secondary: Box<FetchError>,
    },

    /// The session was used before any page was loaded, or could not be opened.
    #[error("session error: {0}")]
    Session(String),
}

impl FetchError {
    /// Network and rendering failures that may succeed on another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Navigation { .. } | FetchError::Timeout { .. } | FetchError::Session(_)
        )
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        FetchError::Navigation {
            url,
            reason: err.to_string(),
        }
    }
}

/// Failures raised by the article store.
///
/// A duplicate `article_id` is not an error; see
/// [`InsertOutcome::Duplicate`](crate::store::InsertOutcome::Duplicate).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("could not create store directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("store connection lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let nav = FetchError::Navigation {
            url: "https://example.test".to_string(),
            reason: "connection reset".to_string(),
        };
        let timeout = FetchError::Timeout {
            url: "https://example.test".to_string(),
            after: Duration::from_secs(10),
        };
        let missing = FetchError::ElementNotFound {
            selector: "#stream".to_string(),
            url: "https://example.test".to_string(),
        };

        assert!(nav.is_transient());
        assert!(timeout.is_transient());
        assert!(!missing.is_transient());
        assert!(!FetchError::Parse("bad".to_string()).is_transient());
    }

    #[test]
    fn test_tiers_exhausted_message_names_both_causes() {
        let err = FetchError::AllTiersExhausted {
            url: "https://example.test/content/a".to_string(),
            primary: Box::new(FetchError::Session("closed".to_string())),
            secondary: Box::new(FetchError::Parse("empty".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("session error: closed"));
        assert!(msg.contains("parse error: empty"));
    }
}
