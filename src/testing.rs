//! In-memory fixtures shared by the unit tests.
//!
//! [`FixtureSite`] is a [`SessionFactory`] serving canned HTML by URL. It
//! records every navigation and tracks open sessions so tests can assert on
//! scan depth and session teardown. [`RecordingBatch`] counts downstream
//! batch invocations.

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::digest::SummaryBatch;
use crate::error::{FetchError, FetchResult};
use crate::fetch::{Session, SessionFactory};

#[derive(Debug, Default)]
struct Inner {
    pages: HashMap<String, String>,
    failing: HashSet<String>,
    navigations: Mutex<Vec<String>>,
    open_sessions: AtomicUsize,
    opened_total: AtomicUsize,
}

/// A static site keyed by exact URL.
#[derive(Debug, Clone, Default)]
pub struct FixtureSite {
    inner: Arc<Inner>,
}

impl FixtureSite {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner_mut(&mut self) -> &mut Inner {
        Arc::get_mut(&mut self.inner).expect("fixture site configured after sessions were opened")
    }

    /// Serve `html` at `url`.
    pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.inner_mut().pages.insert(url.to_string(), html.into());
        self
    }

    /// Make every navigation to `url` fail with a navigation error.
    pub fn failing(mut self, url: &str) -> Self {
        self.inner_mut().failing.insert(url.to_string());
        self
    }

    /// Every URL navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.inner.navigations.lock().unwrap().clone()
    }

    pub fn navigation_count(&self, url: &str) -> usize {
        self.navigations().iter().filter(|u| u.as_str() == url).count()
    }

    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    pub fn opened_total(&self) -> usize {
        self.inner.opened_total.load(Ordering::SeqCst)
    }
}

impl SessionFactory for FixtureSite {
    type Session = FixtureSession;

    async fn open(&self) -> FetchResult<FixtureSession> {
        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.inner.opened_total.fetch_add(1, Ordering::SeqCst);
        Ok(FixtureSession {
            site: Arc::clone(&self.inner),
            page: None,
        })
    }
}

#[derive(Debug)]
pub struct FixtureSession {
    site: Arc<Inner>,
    page: Option<(String, String)>,
}

impl Session for FixtureSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> FetchResult<()> {
        self.site.navigations.lock().unwrap().push(url.to_string());
        if self.site.failing.contains(url) {
            return Err(FetchError::Navigation {
                url: url.to_string(),
                reason: "fixture failure".to_string(),
            });
        }
        match self.site.pages.get(url) {
            Some(html) => {
                self.page = Some((url.to_string(), html.clone()));
                Ok(())
            }
            None => Err(FetchError::Navigation {
                url: url.to_string(),
                reason: "HTTP 404".to_string(),
            }),
        }
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> FetchResult<()> {
        if self.count_matches(selector)? > 0 {
            Ok(())
        } else {
            Err(FetchError::ElementNotFound {
                selector: selector.to_string(),
                url: self.current_url().unwrap_or_default().to_string(),
            })
        }
    }

    fn content(&self) -> FetchResult<&str> {
        self.page
            .as_ref()
            .map(|(_, html)| html.as_str())
            .ok_or_else(|| FetchError::Session("no page loaded".to_string()))
    }

    fn current_url(&self) -> Option<&str> {
        self.page.as_ref().map(|(url, _)| url.as_str())
    }
}

impl Drop for FixtureSession {
    fn drop(&mut self) {
        self.site.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counts downstream batch runs.
#[derive(Debug, Default)]
pub struct RecordingBatch {
    pub runs: AtomicUsize,
}

impl SummaryBatch for RecordingBatch {
    async fn run(&self) -> Result<(), Box<dyn Error>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Defaults pointed at `https://example.test` with retries that never sleep.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.site.base_url = "https://example.test".to_string();
    config.site.bypass_base = "https://bypass.test/full?q=".to_string();
    config.site.archive_base = "https://archive.test/snap/".to_string();
    config.retry.base_delay_ms = 0;
    config.retry.jitter_ms = 0;
    config
}

/// A section page with the given child links in its subnav.
pub fn section_page(children: &[&str]) -> String {
    if children.is_empty() {
        return "<html><body><nav><ul class=\"o-header__subnav-list\"></ul></nav></body></html>"
            .to_string();
    }
    let items: String = children
        .iter()
        .map(|href| format!(r#"<li class="o-header__subnav-item"><a href="{href}">{href}</a></li>"#))
        .collect();
    format!(
        r#"<html><body><nav><ul class="o-header__subnav-list o-header__subnav-list--children">{items}</ul></nav></body></html>"#
    )
}

/// A leaf page whose stream lists `(href, datetime)` teasers in order.
pub fn stream_page(entries: &[(Option<&str>, Option<&str>)]) -> String {
    let items: String = entries
        .iter()
        .map(|(href, datetime)| {
            let time = datetime
                .map(|dt| format!(r#"<time class="o-date" datetime="{dt}">{dt}</time>"#))
                .unwrap_or_default();
            let link = href
                .map(|h| format!(r#"<a class="js-teaser-heading-link" href="{h}">Story</a>"#))
                .unwrap_or_else(|| r#"<a class="js-teaser-heading-link">Story</a>"#.to_string());
            format!(r#"<li class="o-teaser-collection__item">{time}<div>{link}</div></li>"#)
        })
        .collect();
    format!(r#"<html><body><div id="stream"><ul>{items}</ul></div></body></html>"#)
}

/// A canonical article page; `paywalled` adds the teaser marker.
pub fn article_page(headline: &str, published: &str, paragraphs: &[&str], paywalled: bool) -> String {
    let marker = if paywalled {
        r#"<p class="o3-type-detail">Subscribe to unlock this article</p>"#
    } else {
        ""
    };
    let body: String = paragraphs.iter().map(|p| format!("<p>{p}</p>")).collect();
    format!(
        r#"<html><body>{marker}<div class="article-content">
<div class="topper__primary-theme"><span>Global Economy</span></div>
<h1 class="o-topper__headline">{headline}</h1>
<div class="o-topper__standfirst">The standfirst</div>
<p class="article-info__byline">By A Reporter in London</p>
<time class="article-info__timestamp" datetime="{published}">{published}</time>
<article id="article-body">{body}</article>
<figure><img src="https://images.example.test/1.jpg"><figcaption>Dock workers © Bloomberg</figcaption></figure>
</div></body></html>"#
    )
}

/// An archival snapshot whose body sits in the deeply nested archive region.
pub fn archive_page(headline: &str, published: &str, paragraphs: &[&str]) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{p}</p>")).collect();
    let region = format!(
        r#"<div><h1>{headline}</h1><time datetime="{published}">{published}</time>{body}<img src="https://archive.test/img.jpg" alt="Port cranes © Getty"></div>"#
    );
    format!(
        "<html><body><center><div></div><div></div><div></div><div><div><div><div><div>\
         <div><div></div><div><div><div><div></div><div></div>{region}</div></div></div></div>\
         </div></div></div></div></div></center></body></html>"
    )
}
