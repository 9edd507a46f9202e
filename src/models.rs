//! Data models for the crawl pipeline.
//!
//! This module defines the core data structures used throughout the application:
//! - [`SectionMap`]: Persisted map of top-level sections to their leaf section URLs
//! - [`ArticleTask`]: One article queued for fetch, extract, and store
//! - [`ArticleRecord`]: The stored, immutable representation of an article
//! - [`FetchedContent`]: Raw article HTML tagged with the [`Tier`] that produced it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::utils::parse_timestamp;

/// Navigation tree of the site, flattened to leaf sections.
///
/// Regenerated wholesale by section discovery once it is older than the
/// staleness threshold; otherwise only read.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SectionMap {
    /// When discovery last produced this map.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub last_update: DateTime<Utc>,
    /// Top-level section name to its leaf section URLs.
    pub sections: BTreeMap<String, Vec<String>>,
}

impl SectionMap {
    /// A freshly discovered map stamped with the current time.
    pub fn new(sections: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            last_update: Utc::now(),
            sections,
        }
    }

    /// `true` when the map is strictly older than `max_age` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.last_update > max_age
    }

    pub fn leaf_count(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }
}

/// Accept both offset-qualified and naive ISO-8601 timestamps.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

/// One article to fetch, extract, and store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleTask {
    /// Top-level section the article was found under.
    pub section: String,
    /// Last path segment of the leaf section URL.
    pub category: String,
    /// Normalized absolute article URL.
    pub article_url: String,
}

/// Which path produced an article's HTML.
///
/// The tier decides which extraction routine applies: the canonical page and
/// the primary bypass share one DOM shape, archival snapshots have another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Fetched directly from the site; no paywall.
    Free,
    /// Paywalled, fetched through the primary bypass service (tier 1).
    Bypass,
    /// Paywalled, fetched from the archival mirror (tier 2).
    Archive,
}

impl Tier {
    /// Fallback tier number: 0 for free content, 1 or 2 for bypass tiers.
    pub fn level(self) -> u8 {
        match self {
            Tier::Free => 0,
            Tier::Bypass => 1,
            Tier::Archive => 2,
        }
    }
}

/// Article HTML as returned by the paywall resolver.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    /// The URL that was actually navigated to.
    pub fetched_from: String,
    /// Outer HTML of the content container.
    pub html: String,
    pub tier: Tier,
}

/// A stored article. `article_id` is its unique key.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArticleRecord {
    /// Canonical article URL.
    pub article_id: String,
    pub scraped_at: DateTime<Utc>,
    pub paywall: bool,
    pub tier: Tier,
    pub section: String,
    pub category: String,
    pub primary_theme: Option<String>,
    pub headline: Option<String>,
    pub standfirst: Option<String>,
    pub byline: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Body paragraphs in document order.
    pub content: Vec<String>,
    pub media: Media,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Media {
    pub images: Vec<Figure>,
}

/// An image with its caption and photo credit.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Figure {
    pub img_src: Option<String>,
    pub caption: Option<String>,
    pub credit: Option<String>,
}

impl Figure {
    /// Build a figure, splitting a `©` credit off the caption text.
    ///
    /// `"Traders in Tokyo © Reuters"` becomes caption `"Traders in Tokyo"`
    /// and credit `"Reuters"`.
    pub fn from_caption(img_src: Option<String>, caption_text: Option<&str>) -> Self {
        let (caption, credit) = match caption_text.map(str::trim).filter(|t| !t.is_empty()) {
            Some(text) => match text.split_once('©') {
                Some((caption, credit)) => (non_empty(caption), non_empty(credit)),
                None => (Some(text.to_string()), None),
            },
            None => (None, None),
        };
        Self {
            img_src,
            caption,
            credit,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
