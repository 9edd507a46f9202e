//! Runtime configuration loaded from an optional YAML file.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Command-line flags that overlap with the file are applied on top in
//! `main`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

use crate::site::SiteLayout;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteLayout,
    pub workers: Workers,
    pub timeouts: Timeouts,
    pub retry: RetryConfig,
    pub discovery: DiscoveryConfig,
    pub http: HttpConfig,
    pub digest: DigestConfig,
}

/// Concurrency bounds for each fan-out.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Workers {
    /// Top-level sections resolved at once during discovery.
    pub discovery: usize,
    /// Sections scanned for new articles at once (phase 1).
    pub detection: usize,
    /// Articles fetched and stored at once (phase 2). Kept small to limit
    /// load on the bypass mirrors.
    pub extraction: usize,
}

impl Default for Workers {
    fn default() -> Self {
        Self {
            discovery: 8,
            detection: 4,
            extraction: 3,
        }
    }
}

/// Bounded waits, in seconds unless noted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Timeouts {
    pub navigation_secs: u64,
    pub content_wait_secs: u64,
    pub stream_wait_secs: u64,
    pub archive_wait_secs: u64,
    /// Delay between re-polls while waiting for an element.
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_secs: 60,
            content_wait_secs: 10,
            stream_wait_secs: 30,
            archive_wait_secs: 30,
            poll_interval_ms: 1_000,
        }
    }
}

impl Timeouts {
    pub fn navigation(&self) -> Duration {
        Duration::from_secs(self.navigation_secs)
    }

    pub fn content_wait(&self) -> Duration {
        Duration::from_secs(self.content_wait_secs)
    }

    pub fn stream_wait(&self) -> Duration {
        Duration::from_secs(self.stream_wait_secs)
    }

    pub fn archive_wait(&self) -> Duration {
        Duration::from_secs(self.archive_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Backoff settings shared by the failure policies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts before a failing subnav check is treated as a leaf.
    pub discovery_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter added to every delay.
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            discovery_retries: 1,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// A section map older than this is regenerated.
    pub staleness_days: i64,
    /// Nodes this deep are treated as leaves without checking for children.
    pub max_depth: usize,
    /// Only resolve the first N top-level sections.
    pub max_top_level_sections: Option<usize>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            staleness_days: 7,
            max_depth: 8,
            max_top_level_sections: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::days(self.staleness_days)
    }
}

/// HTTP session settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub accept_language: String,
    /// Browserless endpoint used to render pages; plain GET when unset.
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            accept_language: "en-GB,en;q=0.9".to_string(),
            browserless_url: None,
            browserless_token: None,
        }
    }
}

/// Settings for the post-crawl digest batch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DigestConfig {
    /// How far back the digest looks for recently published articles.
    pub window_hours: i64,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self { window_hours: 24 }
    }
}

impl DigestConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.window_hours)
    }
}

impl Config {
    /// Load configuration from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&str>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(Path::new(path)).await?;
        let config: Config = serde_yaml::from_str(&raw)?;
        info!(path, base_url = %config.site.base_url, "Loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.workers.discovery, 8);
        assert_eq!(config.workers.detection, 4);
        assert_eq!(config.workers.extraction, 3);
        assert_eq!(config.timeouts.content_wait(), Duration::from_secs(10));
        assert_eq!(config.discovery.staleness(), chrono::Duration::days(7));
        assert_eq!(config.site.base_url, "https://www.ft.com");
        assert!(config.http.browserless_url.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
site:
  base_url: "https://example.test"
workers:
  extraction: 5
discovery:
  max_top_level_sections: 5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.site.base_url, "https://example.test");
        assert_eq!(config.site.stream, "#stream");
        assert_eq!(config.workers.extraction, 5);
        assert_eq!(config.workers.detection, 4);
        assert_eq!(config.discovery.max_top_level_sections, Some(5));
        assert_eq!(config.discovery.staleness_days, 7);
    }

    #[tokio::test]
    async fn test_load_without_path_is_default() {
        let config = Config::load(None).await.unwrap();
        assert_eq!(config.retry.discovery_retries, 1);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        tokio::fs::write(&path, "timeouts:\n  navigation_secs: 5\n")
            .await
            .unwrap();

        let config = Config::load(Some(path.to_str().unwrap())).await.unwrap();
        assert_eq!(config.timeouts.navigation(), Duration::from_secs(5));
        assert_eq!(config.timeouts.stream_wait(), Duration::from_secs(30));
    }
}
