//! Post-crawl summarization batch.
//!
//! The swarm calls [`SummaryBatch::run`] exactly once after every task has
//! finished. The batch reads the store on its own, so there is no data
//! handed over from the crawl.
//!
//! [`DigestBatch`] groups the articles published inside the digest window by
//! category, writes the grouping as JSON, and then optionally runs an
//! external command (the theme clustering / slide generation job) with the
//! digest path in `DIGEST_PATH`.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::error::Error;
use tokio::process::Command;
use tracing::{info, instrument, warn};

use crate::models::ArticleRecord;
use crate::outputs::json::write_digest;
use crate::store::ArticleStore;

/// A batch job run after each crawl.
pub trait SummaryBatch {
    async fn run(&self) -> Result<(), Box<dyn Error>>;
}

/// Recent articles grouped by category.
#[derive(Debug, Deserialize, Serialize)]
pub struct Digest {
    pub generated_at: DateTime<Utc>,
    pub since: DateTime<Utc>,
    pub article_count: usize,
    pub themes: Vec<Theme>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Theme {
    pub category: String,
    pub articles: Vec<DigestEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DigestEntry {
    pub article_id: String,
    pub section: String,
    pub headline: Option<String>,
    pub standfirst: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub paragraphs: usize,
}

impl From<ArticleRecord> for DigestEntry {
    fn from(r: ArticleRecord) -> Self {
        Self {
            paragraphs: r.content.len(),
            article_id: r.article_id,
            section: r.section,
            headline: r.headline,
            standfirst: r.standfirst,
            published_at: r.published_at,
        }
    }
}

/// Group `records` (newest first) into themes, largest theme first.
///
/// Article order inside a theme is preserved.
pub fn build_digest(records: Vec<ArticleRecord>, since: DateTime<Utc>, now: DateTime<Utc>) -> Digest {
    let article_count = records.len();
    let themes = records
        .into_iter()
        .into_group_map_by(|r| r.category.clone())
        .into_iter()
        .map(|(category, articles)| Theme {
            category,
            articles: articles.into_iter().map(DigestEntry::from).collect(),
        })
        .sorted_by(|a, b| {
            b.articles
                .len()
                .cmp(&a.articles.len())
                .then_with(|| a.category.cmp(&b.category))
        })
        .collect();

    Digest {
        generated_at: now,
        since,
        article_count,
        themes,
    }
}

/// Writes a [`Digest`] and optionally hands it to an external command.
#[derive(Debug)]
pub struct DigestBatch<'a, S> {
    store: &'a S,
    output_dir: String,
    window: chrono::Duration,
    command: Option<String>,
}

impl<'a, S: ArticleStore> DigestBatch<'a, S> {
    pub fn new(
        store: &'a S,
        output_dir: impl Into<String>,
        window: chrono::Duration,
        command: Option<String>,
    ) -> Self {
        Self {
            store,
            output_dir: output_dir.into(),
            window,
            command,
        }
    }
}

impl<S: ArticleStore> SummaryBatch for DigestBatch<'_, S> {
    #[instrument(level = "info", skip_all, fields(output_dir = %self.output_dir))]
    async fn run(&self) -> Result<(), Box<dyn Error>> {
        let now = Utc::now();
        let since = now - self.window;
        let records = self.store.find_recent(since).await?;
        let digest = build_digest(records, since, now);
        info!(
            articles = digest.article_count,
            themes = digest.themes.len(),
            "Built digest"
        );

        let path = write_digest(&digest, &self.output_dir, now).await?;

        let Some(command) = &self.command else {
            return Ok(());
        };
        info!(%command, %path, "Running summary command");
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("DIGEST_PATH", &path)
            .status()
            .await?;
        if !status.success() {
            warn!(%command, ?status, "Summary command failed");
            return Err(format!("summary command exited with {status}").into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Media, Tier};
    use crate::store::SqliteStore;
    use chrono::TimeZone;

    fn record(id: &str, category: &str, hour: u32) -> ArticleRecord {
        ArticleRecord {
            article_id: id.to_string(),
            scraped_at: Utc::now(),
            paywall: false,
            tier: Tier::Free,
            section: "world".to_string(),
            category: category.to_string(),
            primary_theme: None,
            headline: Some(format!("Headline {id}")),
            standfirst: None,
            byline: None,
            published_at: Some(Utc.with_ymd_and_hms(2025, 8, 26, hour, 0, 0).unwrap()),
            updated_at: None,
            content: vec!["p1".to_string(), "p2".to_string()],
            media: Media::default(),
        }
    }

    #[test]
    fn test_build_digest_groups_by_category() {
        let now = Utc.with_ymd_and_hms(2025, 8, 26, 23, 0, 0).unwrap();
        let since = now - chrono::Duration::hours(24);
        let digest = build_digest(
            vec![
                record("c", "markets", 12),
                record("b", "economy", 11),
                record("a", "economy", 10),
            ],
            since,
            now,
        );

        assert_eq!(digest.article_count, 3);
        assert_eq!(digest.themes.len(), 2);
        assert_eq!(digest.themes[0].category, "economy");
        let ids: Vec<&str> = digest.themes[0].articles.iter().map(|a| a.article_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(digest.themes[0].articles[0].paragraphs, 2);
        assert_eq!(digest.themes[1].category, "markets");
    }

    #[tokio::test]
    async fn test_batch_writes_digest_and_runs_command() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut fresh = record("https://example.test/content/a", "economy", 0);
        fresh.published_at = Some(Utc::now() - chrono::Duration::hours(1));
        store.insert(&fresh).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran.txt");
        let command = format!("cp \"$DIGEST_PATH\" {}", marker.display());
        let batch = DigestBatch::new(
            &store,
            dir.path().to_str().unwrap(),
            chrono::Duration::hours(24),
            Some(command),
        );
        batch.run().await.unwrap();

        let copied = tokio::fs::read_to_string(&marker).await.unwrap();
        let digest: Digest = serde_json::from_str(&copied).unwrap();
        assert_eq!(digest.article_count, 1);
        assert_eq!(digest.themes[0].category, "economy");
    }

    #[tokio::test]
    async fn test_failing_command_is_an_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let batch = DigestBatch::new(
            &store,
            dir.path().to_str().unwrap(),
            chrono::Duration::hours(24),
            Some("exit 3".to_string()),
        );
        assert!(batch.run().await.is_err());
    }
}
