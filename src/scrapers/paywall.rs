//! Paywall classification and content fetching.
//!
//! Free articles are read straight from the site. Paywalled articles go
//! through a fixed fallback chain, first success wins:
//!
//! 1. the primary bypass service ([`Tier::Bypass`]), which serves the site's
//!    own article markup;
//! 2. the archival mirror ([`Tier::Archive`]), whose snapshots use a
//!    different DOM shape.
//!
//! The returned [`FetchedContent`] carries the tier so extraction can pick the
//! matching routine. Bypass services are third-party and may rot at any time;
//! nothing outside this module depends on which one answered.

use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{FetchError, FetchResult};
use crate::fetch::Session;
use crate::models::{FetchedContent, Tier};
use crate::policy::{FailurePolicy, Operation};

/// `true` when the article page shows the paywall teaser marker.
///
/// Any failure counts as "not paywalled" so the cheaper free path is tried.
#[instrument(level = "debug", skip(session, config))]
pub async fn classify<S: Session>(session: &mut S, config: &Config, article_url: &str) -> bool {
    let policy = FailurePolicy::for_operation(Operation::Classify, &config.retry);
    let result = async {
        session
            .navigate(article_url, config.timeouts.navigation())
            .await?;
        session.count_matches(&config.site.paywall_marker)
    }
    .await;
    let paywalled = policy.resolve(article_url, result.map(|n| n > 0), false);
    debug!(paywalled, "Classified article");
    paywalled
}

/// Fetch a free article's content container.
#[instrument(level = "debug", skip(session, config))]
pub async fn fetch_free<S: Session>(
    session: &mut S,
    config: &Config,
    article_url: &str,
) -> FetchResult<FetchedContent> {
    let html = fetch_region(
        session,
        config,
        article_url,
        &config.site.article_content,
        config.timeouts.content_wait(),
    )
    .await?;
    Ok(FetchedContent {
        fetched_from: article_url.to_string(),
        html,
        tier: Tier::Free,
    })
}

/// Fetch a paywalled article through the bypass tiers, in order.
#[instrument(level = "debug", skip(session, config))]
pub async fn fetch_paywalled<S: Session>(
    session: &mut S,
    config: &Config,
    article_url: &str,
) -> FetchResult<FetchedContent> {
    let site = &config.site;
    let policy = FailurePolicy::for_operation(Operation::Tier, &config.retry);

    let bypass_url = site.bypass_url(article_url);
    let primary = match fetch_region(
        session,
        config,
        &bypass_url,
        &site.article_content,
        config.timeouts.content_wait(),
    )
    .await
    {
        Ok(html) => {
            info!(tier = Tier::Bypass.level(), "Fetched via primary bypass");
            return Ok(FetchedContent {
                fetched_from: bypass_url,
                html,
                tier: Tier::Bypass,
            });
        }
        Err(e) => {
            policy.fall_back(&bypass_url, &e, ());
            e
        }
    };

    let archive_url = site.archive_url(article_url);
    match fetch_region(
        session,
        config,
        &archive_url,
        &site.archive_content,
        config.timeouts.archive_wait(),
    )
    .await
    {
        Ok(html) => {
            info!(tier = Tier::Archive.level(), "Fetched via archive");
            Ok(FetchedContent {
                fetched_from: archive_url,
                html,
                tier: Tier::Archive,
            })
        }
        Err(secondary) => {
            warn!(error = %secondary, "Archive tier failed");
            Err(FetchError::AllTiersExhausted {
                url: article_url.to_string(),
                primary: Box::new(primary),
                secondary: Box::new(secondary),
            })
        }
    }
}

/// Navigate to `url`, wait for `selector`, and return its outer HTML.
async fn fetch_region<S: Session>(
    session: &mut S,
    config: &Config,
    url: &str,
    selector: &str,
    wait: Duration,
) -> FetchResult<String> {
    session.navigate(url, config.timeouts.navigation()).await?;
    session.wait_for(selector, wait).await?;
    session.outer_html(selector)
}
