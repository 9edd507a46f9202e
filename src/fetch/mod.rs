//! Page sessions: the crawler's only way to look at a web page.
//!
//! A [`Session`] is an exclusive, short-lived view of one page at a time,
//! comparable to a single browser tab. Every unit of concurrent work opens its
//! own session from a [`SessionFactory`] and owns it until the work ends;
//! sessions are never shared or pooled. Teardown happens in `Drop`, so it
//! runs on success, timeout, and error paths alike.
//!
//! [`http::HttpSessionFactory`] is the production implementation.

pub mod http;

use scraper::{Html, Selector};
use std::time::Duration;

use crate::error::{FetchError, FetchResult};

/// One exclusive page session.
pub trait Session {
    /// Load `url`, replacing the current page. Fails with
    /// [`FetchError::Navigation`] or [`FetchError::Timeout`].
    async fn navigate(&mut self, url: &str, timeout: Duration) -> FetchResult<()>;

    /// Wait until `selector` matches on the current page, or fail with
    /// [`FetchError::ElementNotFound`] once `timeout` has elapsed.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> FetchResult<()>;

    /// HTML of the current page.
    fn content(&self) -> FetchResult<&str>;

    /// URL of the current page.
    fn current_url(&self) -> Option<&str>;

    /// Number of elements matching `selector` on the current page.
    fn count_matches(&self, selector: &str) -> FetchResult<usize> {
        let sel = parse_selector(selector)?;
        let doc = Html::parse_document(self.content()?);
        Ok(doc.select(&sel).count())
    }

    /// Outer HTML of the first element matching `selector`.
    fn outer_html(&self, selector: &str) -> FetchResult<String> {
        let sel = parse_selector(selector)?;
        let doc = Html::parse_document(self.content()?);
        doc.select(&sel)
            .next()
            .map(|el| el.html())
            .ok_or_else(|| FetchError::ElementNotFound {
                selector: selector.to_string(),
                url: self.current_url().unwrap_or("<none>").to_string(),
            })
    }
}

/// Opens independent sessions, one per unit of work.
pub trait SessionFactory {
    type Session: Session;

    async fn open(&self) -> FetchResult<Self::Session>;
}

/// Parse a CSS selector, converting the borrowed parse error into a
/// [`FetchError::Selector`].
pub fn parse_selector(selector: &str) -> FetchResult<Selector> {
    Selector::parse(selector).map_err(|e| FetchError::Selector(format!("{selector}: {e}")))
}

/// Text of an element with whitespace runs collapsed to single spaces.
pub fn element_text(el: &scraper::ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
