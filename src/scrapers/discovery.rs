//! Section discovery: resolve the site's navigation tree down to leaf sections.
//!
//! A section is a leaf when its page has no child sub-navigation. Starting
//! from each first-level navigation item, the tree is walked with an explicit
//! stack and a visited set, so cycles in the navigation terminate and depth is
//! bounded by `discovery.max_depth`.
//!
//! Top-level sections are resolved concurrently (`workers.discovery` at a
//! time); the walk inside one top-level section is sequential over a single
//! session.

use futures::stream::{self, StreamExt};
use scraper::Html;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::error::FetchResult;
use crate::fetch::{Session, SessionFactory, parse_selector};
use crate::models::SectionMap;
use crate::policy::{FailurePolicy, Operation};
use crate::utils::{last_path_segment, normalize_link, visit_key};

/// Discover every top-level section and its leaves.
///
/// Fails only when the home page navigation itself cannot be read; failures
/// below that level fall back per [`Operation::Discovery`].
#[instrument(level = "info", skip_all, fields(base = %config.site.base_url))]
pub async fn discover_sections<F: SessionFactory>(
    factory: &F,
    config: &Config,
) -> FetchResult<SectionMap> {
    let top_level = top_level_sections(factory, config).await?;
    info!(count = top_level.len(), "Resolving top-level sections");

    let resolved: Vec<(String, BTreeSet<String>)> = stream::iter(top_level)
        .map(|url| async move {
            let name = last_path_segment(&url).unwrap_or_else(|| url.clone());
            let leaves = discover(factory, config, &url).await;
            info!(section = %name, leaves = leaves.len(), "Resolved leaf sections");
            (name, leaves)
        })
        .buffer_unordered(config.workers.discovery.max(1))
        .collect()
        .await;

    let mut sections: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (name, leaves) in resolved {
        sections.entry(name).or_default().extend(leaves);
    }
    let map = SectionMap::new(
        sections
            .into_iter()
            .map(|(name, leaves)| (name, leaves.into_iter().collect()))
            .collect(),
    );
    info!(
        sections = map.sections.len(),
        leaves = map.leaf_count(),
        "Section discovery complete"
    );
    Ok(map)
}

/// First-level navigation links on the home page, excluding the home link.
#[instrument(level = "info", skip_all)]
pub async fn top_level_sections<F: SessionFactory>(
    factory: &F,
    config: &Config,
) -> FetchResult<Vec<String>> {
    let site = &config.site;
    let base = site.base()?;
    let link_sel = parse_selector(&site.top_nav_links)?;

    let mut session = factory.open().await?;
    session
        .navigate(base.as_str(), config.timeouts.navigation())
        .await?;

    let doc = Html::parse_document(session.content()?);
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for link in doc.select(&link_sel) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(url) = normalize_link(&base, href) else {
            continue;
        };
        if url.path() == "/" {
            continue;
        }
        if seen.insert(visit_key(&url)) {
            urls.push(url.to_string());
        }
    }

    if let Some(limit) = config.discovery.max_top_level_sections {
        urls.truncate(limit);
    }
    debug!(urls = ?urls, "Top-level sections");
    Ok(urls)
}

/// Resolve `top_level_url` to the set of leaf section URLs beneath it.
///
/// Returns `{top_level_url}` when the section has no children. Never fails:
/// a node whose subnav cannot be read (after retries) is treated as a leaf.
#[instrument(level = "info", skip(factory, config))]
pub async fn discover<F: SessionFactory>(
    factory: &F,
    config: &Config,
    top_level_url: &str,
) -> BTreeSet<String> {
    let policy = FailurePolicy::for_operation(Operation::Discovery, &config.retry);
    let mut leaves = BTreeSet::new();

    let base = match config.site.base() {
        Ok(base) => base,
        Err(e) => {
            leaves.insert(top_level_url.to_string());
            return policy.fall_back(top_level_url, &e, leaves);
        }
    };
    let Some(root) = normalize_link(&base, top_level_url) else {
        warn!("Unresolvable section URL; keeping it as a leaf");
        leaves.insert(top_level_url.to_string());
        return leaves;
    };

    let mut session = match factory.open().await {
        Ok(session) => session,
        Err(e) => {
            leaves.insert(root.to_string());
            return policy.fall_back(root.as_str(), &e, leaves);
        }
    };

    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<(Url, usize)> = vec![(root, 0)];

    while let Some((url, depth)) = stack.pop() {
        if !visited.insert(visit_key(&url)) {
            debug!(%url, "Already visited; skipping");
            continue;
        }
        if depth >= config.discovery.max_depth {
            warn!(%url, depth, "Maximum discovery depth reached; treating as leaf");
            leaves.insert(url.to_string());
            continue;
        }

        // Links back to this node or to visited nodes lead nowhere new.
        let children: Vec<Url> = child_sections_with_retry(&mut session, config, &policy, &base, &url)
            .await
            .into_iter()
            .filter(|child| !visited.contains(&visit_key(child)))
            .collect();
        if children.is_empty() {
            debug!(%url, depth, "Leaf section");
            leaves.insert(url.to_string());
        } else {
            debug!(%url, depth, children = children.len(), "Section has subsections");
            // Reverse so children are walked in navigation order.
            stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
        }
    }

    leaves
}

async fn child_sections_with_retry<S: Session>(
    session: &mut S,
    config: &Config,
    policy: &FailurePolicy,
    base: &Url,
    url: &Url,
) -> Vec<Url> {
    let mut attempt = 0;
    loop {
        match child_sections(session, config, base, url).await {
            Ok(children) => return children,
            Err(e) => match policy.retry_delay(attempt, &e) {
                Some(delay) => {
                    policy.note_retry(url.as_str(), attempt, delay, &e);
                    sleep(delay).await;
                    attempt += 1;
                }
                None => return policy.fall_back(url.as_str(), &e, Vec::new()),
            },
        }
    }
}

/// Child section links of the page at `url`.
///
/// A page without a child subnav list is a genuine leaf and yields an empty
/// list; only navigation or parse failures are errors.
async fn child_sections<S: Session>(
    session: &mut S,
    config: &Config,
    base: &Url,
    url: &Url,
) -> FetchResult<Vec<Url>> {
    let site = &config.site;
    session
        .navigate(url.as_str(), config.timeouts.navigation())
        .await?;
    if session.count_matches(&site.subnav_list)? == 0 {
        return Ok(Vec::new());
    }

    let list_html = session.outer_html(&site.subnav_list)?;
    let fragment = Html::parse_fragment(&list_html);
    let item_sel = parse_selector(&site.subnav_item)?;
    let link_sel = parse_selector("a[href]")?;

    let children = fragment
        .select(&item_sel)
        .filter_map(|item| item.select(&link_sel).next())
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| normalize_link(base, href))
        .collect();
    Ok(children)
}
