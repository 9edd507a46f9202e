//! Helpers for URL cleanup, timestamp parsing, and file system checks.
//!
//! This module provides helper functions used throughout the crawler:
//! - Link normalization so article IDs compare equal across runs
//! - Category and section naming derived from URL paths
//! - Lenient timestamp parsing for teaser and article metadata
//! - String truncation for logging
//! - File system validation for output directories

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

static PROTOCOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://").expect("static regex"));

/// Repair URLs that carry more than one protocol prefix.
///
/// Stream links occasionally arrive with the origin prepended twice
/// (`https://www.ft.comhttps://www.ft.com/content/...`). When a URL holds
/// more than one `http://` or `https://`, everything before the last one is
/// dropped.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(clean_url(" https://a.testhttps://a.test/x "), "https://a.test/x");
/// assert_eq!(clean_url("/content/abc"), "/content/abc");
/// ```
pub fn clean_url(url: &str) -> String {
    let trimmed = url.trim();
    let starts: Vec<usize> = PROTOCOL.find_iter(trimmed).map(|m| m.start()).collect();
    match starts.as_slice() {
        [_, .., last] => trimmed[*last..].to_string(),
        _ => trimmed.to_string(),
    }
}

/// Resolve `href` against `base` and strip query and fragment.
///
/// Returns `None` for empty or unresolvable links and for non-HTTP schemes
/// (`javascript:`, `mailto:`).
pub fn normalize_link(base: &Url, href: &str) -> Option<Url> {
    let cleaned = clean_url(href);
    if cleaned.is_empty() {
        return None;
    }
    let mut resolved = base.join(&cleaned).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    resolved.set_query(None);
    resolved.set_fragment(None);
    Some(resolved)
}

/// Canonical string form of a link, used as `article_id`.
pub fn normalize_article_url(base: &Url, href: &str) -> Option<String> {
    normalize_link(base, href).map(String::from)
}

/// Key used to detect revisits while walking the section tree.
///
/// Trailing slashes are ignored so `/world` and `/world/` are one node.
pub fn visit_key(url: &Url) -> String {
    let mut key = format!("{}{}", url.origin().ascii_serialization(), url.path());
    while key.ends_with('/') {
        key.pop();
    }
    key
}

/// Last non-empty path segment of a URL.
///
/// Leaf section URLs are named this way to get the article category
/// (`https://www.ft.com/global-economy` -> `global-economy`), and top-level
/// section URLs to get the section name.
pub fn last_path_segment(url: &str) -> Option<String> {
    let parsed = Url::parse(&clean_url(url)).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

/// Parse an ISO-8601 timestamp, with or without an offset.
///
/// Values without an offset are taken as UTC. Anything else yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes (backing off to a character
/// boundary) with an ellipsis and byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
