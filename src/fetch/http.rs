//! HTTP-backed page sessions.
//!
//! Pages are fetched with `reqwest` using desktop-browser request headers
//! (best-effort header spoofing, nothing more). When a Browserless endpoint
//! is configured, navigation goes through its `/content` API instead so the
//! returned HTML is the rendered DOM.
//!
//! A static HTML response cannot "finish rendering" later, so
//! [`HttpSession::wait_for`] re-polls the page until the selector matches or
//! the wait bound runs out.

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, trace};

use super::{Session, SessionFactory};
use crate::config::{Config, HttpConfig};
use crate::error::{FetchError, FetchResult};
use crate::utils::truncate_for_log;

/// Builds a fresh [`HttpSession`] (with its own client) per unit of work.
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    http: HttpConfig,
    poll_interval: Duration,
}

impl HttpSessionFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            http: config.http.clone(),
            poll_interval: config.timeouts.poll_interval(),
        }
    }

    fn headers(&self) -> FetchResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&self.http.user_agent)?);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, header_value(&self.http.accept_language)?);
        Ok(headers)
    }
}

fn header_value(raw: &str) -> FetchResult<HeaderValue> {
    HeaderValue::from_str(raw).map_err(|e| FetchError::Session(format!("invalid header value: {e}")))
}

impl SessionFactory for HttpSessionFactory {
    type Session = HttpSession;

    async fn open(&self) -> FetchResult<HttpSession> {
        let client = reqwest::Client::builder()
            .default_headers(self.headers()?)
            .build()
            .map_err(|e| FetchError::Session(format!("failed to build HTTP client: {e}")))?;
        trace!("HTTP session opened");
        Ok(HttpSession {
            client,
            browserless: self.http.browserless_url.as_ref().map(|url| Browserless {
                endpoint: url.trim_end_matches('/').to_string(),
                token: self.http.browserless_token.clone(),
            }),
            poll_interval: self.poll_interval,
            page: None,
        })
    }
}

#[derive(Debug)]
struct Browserless {
    endpoint: String,
    token: Option<String>,
}

#[derive(Debug)]
struct Page {
    url: String,
    html: String,
}

/// A session holding at most one loaded page.
#[derive(Debug)]
pub struct HttpSession {
    client: reqwest::Client,
    browserless: Option<Browserless>,
    poll_interval: Duration,
    page: Option<Page>,
}

impl HttpSession {
    async fn get(&self, url: &str) -> FetchResult<String> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Navigation {
                url: url.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        Ok(resp.text().await?)
    }

    /// Fetch rendered HTML through the Browserless `/content` endpoint.
    async fn render(&self, browserless: &Browserless, url: &str) -> FetchResult<String> {
        let mut endpoint = format!("{}/content", browserless.endpoint);
        if let Some(ref token) = browserless.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let resp = self
            .client
            .post(&endpoint)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FetchError::Navigation {
                url: url.to_string(),
                reason: format!(
                    "browserless status {}: {}",
                    status.as_u16(),
                    truncate_for_log(&message, 200)
                ),
            });
        }
        Ok(resp.text().await?)
    }
}

impl Session for HttpSession {
    #[instrument(level = "debug", skip(self), fields(rendered = self.browserless.is_some()))]
    async fn navigate(&mut self, url: &str, bound: Duration) -> FetchResult<()> {
        let started = Instant::now();
        let fetch = async {
            match &self.browserless {
                Some(browserless) => self.render(browserless, url).await,
                None => self.get(url).await,
            }
        };
        let html = timeout(bound, fetch)
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
                after: bound,
            })??;

        debug!(
            bytes = html.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Page loaded"
        );
        self.page = Some(Page {
            url: url.to_string(),
            html,
        });
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, bound: Duration) -> FetchResult<()> {
        let started = Instant::now();
        loop {
            if self.count_matches(selector)? > 0 {
                return Ok(());
            }
            let url = self
                .current_url()
                .ok_or_else(|| FetchError::Session("wait_for called before navigate".to_string()))?
                .to_string();

            let elapsed = started.elapsed();
            if elapsed + self.poll_interval >= bound {
                return Err(FetchError::ElementNotFound {
                    selector: selector.to_string(),
                    url,
                });
            }
            sleep(self.poll_interval).await;
            let remaining = bound.saturating_sub(started.elapsed());
            trace!(%url, selector, ?remaining, "Re-polling page");
            self.navigate(&url, remaining).await?;
        }
    }

    fn content(&self) -> FetchResult<&str> {
        self.page
            .as_ref()
            .map(|p| p.html.as_str())
            .ok_or_else(|| FetchError::Session("no page loaded".to_string()))
    }

    fn current_url(&self) -> Option<&str> {
        self.page.as_ref().map(|p| p.url.as_str())
    }
}

impl Drop for HttpSession {
    fn drop(&mut self) {
        trace!(last_url = ?self.current_url(), "HTTP session closed");
    }
}
