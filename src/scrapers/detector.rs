//! New-article detection for a leaf section.
//!
//! A leaf section page renders an article stream, newest first. Two
//! [`Cutoff`] policies decide which entries are new:
//!
//! - [`Cutoff::Watermark`] trusts the stream's reverse-chronological order
//!   and stops scanning at the first entry not newer than the watermark.
//!   If the site ever reorders its stream, this silently truncates.
//! - [`Cutoff::Membership`] checks every entry against the store and never
//!   stops early.
//!
//! A page that cannot be fetched or read yields no articles for this run
//! (see [`Operation::Detect`]); the section is scanned again next run.

use chrono::{DateTime, Utc};
use scraper::Html;
use std::collections::HashSet;
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::Config;
use crate::error::FetchResult;
use crate::fetch::{Session, SessionFactory, parse_selector};
use crate::policy::{FailurePolicy, Operation};
use crate::store::ArticleStore;
use crate::utils::{normalize_article_url, parse_timestamp};

/// How to decide whether a stream entry is new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    /// Entries strictly newer than this timestamp; `None` accepts every
    /// entry with a readable timestamp.
    Watermark(Option<DateTime<Utc>>),
    /// Entries whose URL is not yet in the store.
    Membership,
}

/// One teaser from the stream, as rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Normalized absolute URL; `None` when the teaser had no usable link.
    pub url: Option<String>,
    /// Raw `datetime` attribute, if present.
    pub datetime: Option<String>,
}

/// New article URLs in `leaf_url`'s stream, in stream order.
#[instrument(level = "info", skip(factory, config, store))]
pub async fn new_articles<F, S>(
    factory: &F,
    config: &Config,
    store: &S,
    leaf_url: &str,
    cutoff: Cutoff,
) -> Vec<String>
where
    F: SessionFactory,
    S: ArticleStore,
{
    let policy = FailurePolicy::for_operation(Operation::Detect, &config.retry);
    let entries = policy.resolve(leaf_url, read_stream(factory, config, leaf_url).await, Vec::new());

    let articles = match cutoff {
        Cutoff::Watermark(watermark) => select_after_watermark(&entries, watermark),
        Cutoff::Membership => select_unseen(&entries, store).await,
    };
    info!(
        scanned = entries.len(),
        new = articles.len(),
        "Detected new articles"
    );
    articles
}

/// Load the leaf page and parse its stream entries.
async fn read_stream<F: SessionFactory>(
    factory: &F,
    config: &Config,
    leaf_url: &str,
) -> FetchResult<Vec<StreamEntry>> {
    let site = &config.site;
    let mut session = factory.open().await?;
    session
        .navigate(leaf_url, config.timeouts.navigation())
        .await?;
    session
        .wait_for(&site.stream, config.timeouts.stream_wait())
        .await?;
    let stream_html = session.outer_html(&site.stream)?;
    parse_stream(&stream_html, config, &site.base()?)
}

/// Parse the stream container's HTML into entries, in document order.
pub fn parse_stream(stream_html: &str, config: &Config, base: &Url) -> FetchResult<Vec<StreamEntry>> {
    let site = &config.site;
    let item_sel = parse_selector(&site.stream_item)?;
    let link_sel = parse_selector(&site.stream_link)?;
    let time_sel = parse_selector(&site.stream_time)?;

    let fragment = Html::parse_fragment(stream_html);
    let entries = fragment
        .select(&item_sel)
        .map(|item| StreamEntry {
            url: item
                .select(&link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| normalize_article_url(base, href)),
            datetime: item
                .select(&time_sel)
                .next()
                .and_then(|t| t.value().attr("datetime"))
                .map(str::to_string),
        })
        .collect();
    Ok(entries)
}

/// Watermark policy: scan in order and stop at the first entry that is not
/// strictly newer than `watermark`.
///
/// Entries missing a link or a timestamp, or with an unreadable timestamp,
/// are skipped without stopping the scan.
pub fn select_after_watermark(entries: &[StreamEntry], watermark: Option<DateTime<Utc>>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    for entry in entries {
        let (Some(url), Some(raw)) = (&entry.url, &entry.datetime) else {
            continue;
        };
        let Some(published) = parse_timestamp(raw) else {
            debug!(%url, raw = %raw, "Unreadable teaser timestamp; skipping");
            continue;
        };
        if watermark.is_some_and(|wm| published <= wm) {
            debug!(%url, %published, "Reached watermark; stopping scan");
            break;
        }
        if seen.insert(url.clone()) {
            selected.push(url.clone());
        }
    }
    selected
}

/// Membership policy: keep every entry whose URL is not already stored.
///
/// A failed existence check counts as "not stored"; the later insert is a
/// no-op if the article was in fact present.
pub async fn select_unseen<S: ArticleStore>(entries: &[StreamEntry], store: &S) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    for url in entries.iter().filter_map(|e| e.url.as_ref()) {
        if !seen.insert(url.clone()) {
            continue;
        }
        match store.exists(url).await {
            Ok(true) => debug!(%url, "Already stored; skipping"),
            Ok(false) => selected.push(url.clone()),
            Err(e) => {
                debug!(%url, error = %e, "Existence check failed; treating as new");
                selected.push(url.clone());
            }
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleRecord, Media, Tier};
    use crate::store::SqliteStore;
    use crate::testing::{FixtureSite, stream_page, test_config};
    use chrono::TimeZone;

    const LEAF: &str = "https://example.test/economy";

    fn t(h: u32) -> String {
        format!("2025-08-26T{h:02}:00:00.000Z")
    }

    fn stored(id: &str) -> ArticleRecord {
        ArticleRecord {
            article_id: id.to_string(),
            scraped_at: Utc::now(),
            paywall: false,
            tier: Tier::Free,
            section: "world".to_string(),
            category: "economy".to_string(),
            primary_theme: None,
            headline: None,
            standfirst: None,
            byline: None,
            published_at: None,
            updated_at: None,
            content: vec![],
            media: Media::default(),
        }
    }

    #[tokio::test]
    async fn test_watermark_stops_at_first_old_entry() {
        let (t5, t4, t3, t2, t1) = (t(15), t(14), t(13), t(12), t(11));
        // The entry after T3 is newer than the watermark: it would be picked
        // up if the scan kept going past T3.
        let t6 = t(16);
        let site = FixtureSite::new().page(
            LEAF,
            stream_page(&[
                (Some("/content/t5"), Some(t5.as_str())),
                (Some("/content/t4"), Some(t4.as_str())),
                (Some("/content/t3"), Some(t3.as_str())),
                (Some("/content/late"), Some(t6.as_str())),
                (Some("/content/t2"), Some(t2.as_str())),
                (Some("/content/t1"), Some(t1.as_str())),
            ]),
        );
        let store = SqliteStore::open_in_memory().unwrap();
        let watermark = Utc.with_ymd_and_hms(2025, 8, 26, 13, 0, 0).unwrap();

        let found = new_articles(&site, &test_config(), &store, LEAF, Cutoff::Watermark(Some(watermark))).await;
        assert_eq!(
            found,
            vec!["https://example.test/content/t5", "https://example.test/content/t4"]
        );
    }

    #[test]
    fn test_watermark_skips_malformed_without_stopping() {
        let entry = |url: Option<&str>, dt: Option<&str>| StreamEntry {
            url: url.map(str::to_string),
            datetime: dt.map(str::to_string),
        };
        let entries = vec![
            entry(Some("https://example.test/content/a"), Some("not a date")),
            entry(None, Some("2025-08-26T15:00:00Z")),
            entry(Some("https://example.test/content/b"), None),
            entry(Some("https://example.test/content/c"), Some("2025-08-26T14:00:00Z")),
        ];
        let wm = Utc.with_ymd_and_hms(2025, 8, 26, 13, 0, 0).unwrap();
        assert_eq!(
            select_after_watermark(&entries, Some(wm)),
            vec!["https://example.test/content/c"]
        );
    }

    #[test]
    fn test_no_watermark_accepts_all_dated_entries() {
        let entries = vec![
            StreamEntry {
                url: Some("https://example.test/content/a".to_string()),
                datetime: Some("2020-01-01T00:00:00Z".to_string()),
            },
            StreamEntry {
                url: Some("https://example.test/content/a".to_string()),
                datetime: Some("2019-01-01T00:00:00Z".to_string()),
            },
        ];
        assert_eq!(
            select_after_watermark(&entries, None),
            vec!["https://example.test/content/a"]
        );
    }

    #[tokio::test]
    async fn test_membership_returns_only_unstored_in_any_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&stored("https://example.test/content/a")).await.unwrap();
        let config = test_config();

        for order in [["/content/a", "/content/b"], ["/content/b", "/content/a"]] {
            let site = FixtureSite::new().page(
                LEAF,
                stream_page(&[(Some(order[0]), None), (Some(order[1]), None)]),
            );
            let found = new_articles(&site, &config, &store, LEAF, Cutoff::Membership).await;
            assert_eq!(found, vec!["https://example.test/content/b"]);
        }
    }

    #[tokio::test]
    async fn test_membership_skips_entries_without_link() {
        let store = SqliteStore::open_in_memory().unwrap();
        let site = FixtureSite::new().page(
            LEAF,
            stream_page(&[(None, Some("2025-08-26T10:00:00Z")), (Some("/content/x"), None)]),
        );
        let found = new_articles(&site, &test_config(), &store, LEAF, Cutoff::Membership).await;
        assert_eq!(found, vec!["https://example.test/content/x"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_yields_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let site = FixtureSite::new().failing(LEAF);
        let found = new_articles(&site, &test_config(), &store, LEAF, Cutoff::Membership).await;
        assert!(found.is_empty());
        assert_eq!(site.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_missing_stream_yields_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let site = FixtureSite::new().page(LEAF, "<html><body><p>Maintenance</p></body></html>");
        let found = new_articles(&site, &test_config(), &store, LEAF, Cutoff::Watermark(None)).await;
        assert!(found.is_empty());
    }

    #[test]
    fn test_parse_stream_normalizes_links() {
        let config = test_config();
        let base = config.site.base().unwrap();
        let html = stream_page(&[(Some("https://example.testhttps://example.test/content/abc-123?x=1"), Some("2025-08-26T10:00:00Z"))]);
        let doc = Html::parse_document(&html);
        let stream = doc.select(&parse_selector("#stream").unwrap()).next().unwrap().html();

        let entries = parse_stream(&stream, &config, &base).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url.as_deref(), Some("https://example.test/content/abc-123"));
        assert_eq!(entries[0].datetime.as_deref(), Some("2025-08-26T10:00:00Z"));
    }
}
