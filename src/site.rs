//! Page layout of the crawled news site.
//!
//! Every selector and URL prefix the scrapers depend on lives here so a
//! markup change on the site is a config edit rather than a code change.
//! The defaults describe the FT.com layout.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FetchError, FetchResult};

/// Selectors and external service prefixes for one site.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteLayout {
    /// Origin that relative links are resolved against.
    pub base_url: String,
    /// First-level navigation links on the home page.
    pub top_nav_links: String,
    /// Child sub-navigation list on a section page.
    pub subnav_list: String,
    /// One child item inside [`SiteLayout::subnav_list`].
    pub subnav_item: String,
    /// Container of a leaf section's article stream.
    pub stream: String,
    /// One teaser inside the stream.
    pub stream_item: String,
    /// Heading link of a teaser.
    pub stream_link: String,
    /// Timestamp element of a teaser, read through its `datetime` attribute.
    pub stream_time: String,
    /// Present at least once on a truncated (paywalled) article.
    pub paywall_marker: String,
    /// Main body container on canonical and bypass pages.
    pub article_content: String,
    /// Body region on an archival snapshot.
    pub archive_content: String,
    /// Primary paywall bypass; the article URL is appended verbatim.
    pub bypass_base: String,
    /// Archival mirror; the article URL is appended verbatim.
    pub archive_base: String,
}

impl Default for SiteLayout {
    fn default() -> Self {
        Self {
            base_url: "https://www.ft.com".to_string(),
            top_nav_links: "nav#o-header-nav-desktop li.o-header__nav-item > a[href]".to_string(),
            subnav_list: "ul.o-header__subnav-list--children".to_string(),
            subnav_item: "li.o-header__subnav-item".to_string(),
            stream: "#stream".to_string(),
            stream_item: "li.o-teaser-collection__item".to_string(),
            stream_link: "a.js-teaser-heading-link".to_string(),
            stream_time: "time".to_string(),
            paywall_marker: "p.o3-type-detail".to_string(),
            article_content: "div.article-content".to_string(),
            archive_content: "body > center > div:nth-of-type(4) > div > div:nth-of-type(1) > div > div \
                 > div:nth-of-type(1) > div:nth-of-type(2) > div > div > div:nth-of-type(3)"
                .to_string(),
            bypass_base: "https://accessarticlenow.com/api/c/full?q=".to_string(),
            archive_base: "https://archive.md/20250824050137/".to_string(),
        }
    }
}

impl SiteLayout {
    /// Parsed [`SiteLayout::base_url`].
    pub fn base(&self) -> FetchResult<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| FetchError::Parse(format!("base url {}: {e}", self.base_url)))
    }

    pub fn bypass_url(&self, article_url: &str) -> String {
        format!("{}{}", self.bypass_base, article_url)
    }

    pub fn archive_url(&self, article_url: &str) -> String {
        format!("{}{}", self.archive_base, article_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Selector;

    #[test]
    fn test_default_selectors_parse() {
        let layout = SiteLayout::default();
        for sel in [
            &layout.top_nav_links,
            &layout.subnav_list,
            &layout.subnav_item,
            &layout.stream,
            &layout.stream_item,
            &layout.stream_link,
            &layout.stream_time,
            &layout.paywall_marker,
            &layout.article_content,
            &layout.archive_content,
        ] {
            assert!(Selector::parse(sel).is_ok(), "selector failed to parse: {sel}");
        }
    }

    #[test]
    fn test_tier_urls_append_verbatim() {
        let layout = SiteLayout::default();
        let article = "https://www.ft.com/content/abc-123";
        assert_eq!(
            layout.bypass_url(article),
            "https://accessarticlenow.com/api/c/full?q=https://www.ft.com/content/abc-123"
        );
        assert_eq!(
            layout.archive_url(article),
            "https://archive.md/20250824050137/https://www.ft.com/content/abc-123"
        );
    }

    #[test]
    fn test_base_parses() {
        let layout = SiteLayout {
            base_url: "https://example.test".to_string(),
            ..SiteLayout::default()
        };
        assert_eq!(layout.base().unwrap().as_str(), "https://example.test/");
    }
}
