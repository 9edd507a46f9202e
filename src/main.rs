//! # FT Crawler
//!
//! An incremental crawler for a paywalled news site. Each run picks up the
//! articles published since the previous run and stores them in SQLite.
//!
//! ## Usage
//!
//! ```sh
//! ft_crawler --db-url ./data/articles.db --policy membership
//! ```
//!
//! ## Architecture
//!
//! 1. **Section discovery**: resolve the navigation tree to leaf sections,
//!    only when the persisted map is older than the staleness threshold
//! 2. **Detection**: scan every leaf section's stream for new article URLs
//!    (4 sections at a time)
//! 3. **Extraction**: classify, fetch through the paywall tiers, extract and
//!    store each article (3 at a time)
//! 4. **Digest**: group recent articles by category and hand them to the
//!    summary command

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod digest;
mod error;
mod fetch;
mod models;
mod outputs;
mod policy;
mod scrapers;
mod site;
mod store;
mod swarm;
mod utils;

#[cfg(test)]
mod testing;

use cli::Cli;
use config::Config;
use digest::DigestBatch;
use fetch::SessionFactory;
use fetch::http::HttpSessionFactory;
use models::SectionMap;
use outputs::json;
use scrapers::discovery::discover_sections;
use store::SqliteStore;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("ft_crawler starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let mut config = Config::load(args.config.as_deref()).await?;
    if let Some(base_url) = &args.base_url {
        config.site.base_url = base_url.clone();
    }

    // Early check: ensure the report dir is writable before crawling
    if let Err(e) = ensure_writable_dir(&args.report_dir).await {
        error!(
            path = %args.report_dir,
            error = %e,
            "Report directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let factory = HttpSessionFactory::new(&config);

    // ---- Section map ----
    let existing = match json::load_section_map(&args.sections_file).await {
        Ok(map) => map,
        Err(e) => {
            warn!(path = %args.sections_file, error = %e, "Section map unreadable; rediscovering");
            None
        }
    };
    let map = match existing {
        Some(map) if !args.force_discovery && !map.is_stale(Utc::now(), config.discovery.staleness()) => {
            info!(last_update = %map.last_update, "Section map is fresh");
            map
        }
        previous => refresh_section_map(&factory, &config, &args.sections_file, previous).await?,
    };

    if args.discover_only {
        info!(leaves = map.leaf_count(), "Discovery only; stopping");
        return Ok(());
    }

    // ---- Store ----
    let store = match SqliteStore::open(&args.db_url) {
        Ok(store) => store,
        Err(e) => {
            error!(path = %args.db_url, error = %e, "Failed to open article store");
            return Err(e.into());
        }
    };
    let batch = DigestBatch::new(
        &store,
        args.digest_dir.clone(),
        config.digest.window(),
        args.summary_command.clone(),
    );

    // ---- Crawl ----
    let report = swarm::run(&factory, &config, &store, &batch, &map, args.policy).await;

    for failed in &report.failed {
        debug!(url = %failed.article_url, stage = %failed.stage, reason = %failed.reason, "Failed task");
    }
    match json::write_run_report(&report, &args.report_dir).await {
        Ok(path) => info!(%path, "Wrote run report"),
        Err(e) => error!(error = %e, "Failed to write run report"),
    }

    info!(
        total = report.attempted,
        successful = report.stored,
        duplicates = report.duplicates,
        failed = report.failed.len(),
        "Crawl complete"
    );

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

/// Run section discovery and persist the result.
///
/// When discovery fails the previous map, however stale, is reused; with no
/// previous map the failure is fatal.
async fn refresh_section_map<F: SessionFactory>(
    factory: &F,
    config: &Config,
    sections_file: &str,
    previous: Option<SectionMap>,
) -> Result<SectionMap, Box<dyn Error>> {
    info!("Section map missing or stale; running discovery");
    match discover_sections(factory, config).await {
        Ok(map) => {
            if let Err(e) = json::write_section_map(&map, sections_file).await {
                error!(path = %sections_file, error = %e, "Failed to persist section map");
            }
            Ok(map)
        }
        Err(e) => match previous {
            Some(map) => {
                warn!(error = %e, last_update = %map.last_update, "Section discovery failed; using previous map");
                Ok(map)
            }
            None => {
                error!(error = %e, "Section discovery failed and no previous map exists");
                Err(e.into())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixtureSite, section_page, test_config};
    use std::collections::BTreeMap;

    fn old_map() -> SectionMap {
        let mut sections = BTreeMap::new();
        sections.insert("world".to_string(), vec!["https://example.test/old".to_string()]);
        SectionMap::new(sections)
    }

    #[tokio::test]
    async fn test_refresh_persists_discovered_map() {
        let home = r#"<html><body><nav id="o-header-nav-desktop"><ul>
            <li class="o-header__nav-item"><a href="/">Home</a></li>
            <li class="o-header__nav-item"><a href="/world">World</a></li>
            </ul></nav></body></html>"#;
        let site = FixtureSite::new()
            .page("https://example.test/", home)
            .page("https://example.test/world", section_page(&[]));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sections.json");
        let path = path.to_str().unwrap();

        let map = refresh_section_map(&site, &test_config(), path, None).await.unwrap();
        assert_eq!(map.sections["world"], vec!["https://example.test/world"]);
        let persisted = json::load_section_map(path).await.unwrap().unwrap();
        assert_eq!(persisted.sections, map.sections);
    }

    #[tokio::test]
    async fn test_refresh_falls_back_to_previous_map() {
        let site = FixtureSite::new().failing("https://example.test/");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sections.json");

        let map = refresh_section_map(&site, &test_config(), path.to_str().unwrap(), Some(old_map()))
            .await
            .unwrap();
        assert_eq!(map.sections, old_map().sections);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_refresh_without_previous_map_is_fatal() {
        let site = FixtureSite::new().failing("https://example.test/");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sections.json");

        assert!(
            refresh_section_map(&site, &test_config(), path.to_str().unwrap(), None)
                .await
                .is_err()
        );
    }
}
