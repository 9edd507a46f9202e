//! Task swarm coordinator.
//!
//! One crawl run happens in two phases with separate concurrency bounds:
//!
//! 1. **Detection.** One future per top-level section
//!    (`workers.detection` at a time, results kept in map order) walks its
//!    leaf sections and collects new article URLs. The phase is a barrier:
//!    nothing is fetched until every section has reported.
//! 2. **Extraction.** One future per article (`workers.extraction` at a
//!    time) opens its own session, classifies, fetches, extracts and stores.
//!
//! No task failure escapes its own future; each becomes a [`TaskOutcome`]
//! and shows up in the [`RunReport`]. The downstream [`SummaryBatch`] runs
//! once after both phases, whatever happened.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::digest::SummaryBatch;
use crate::error::FetchResult;
use crate::fetch::SessionFactory;
use crate::models::{ArticleTask, FetchedContent, SectionMap};
use crate::scrapers::detector::{self, Cutoff};
use crate::scrapers::{extract, paywall};
use crate::store::{ArticleStore, InsertOutcome};
use crate::utils::{clean_url, last_path_segment};

/// Which rule decides that a stream entry is new.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DetectionPolicy {
    /// Every entry not yet in the store.
    #[default]
    Membership,
    /// Entries newer than the category's latest stored publication time.
    Watermark,
}

/// Where in the per-article pipeline a task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Extract,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Store => "store",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Stored,
    /// Another task or an earlier run stored the article first.
    Duplicate,
    Failed { stage: Stage, reason: String },
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task: ArticleTask,
    pub outcome: TaskOutcome,
}

/// A task that ended in [`TaskOutcome::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTask {
    pub article_url: String,
    pub section: String,
    pub category: String,
    pub stage: Stage,
    pub reason: String,
}

/// Summary of one crawl run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub policy: DetectionPolicy,
    pub sections: usize,
    pub leaf_sections: usize,
    pub attempted: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub failed: Vec<FailedTask>,
}

/// Run both phases over `map`, then the downstream batch.
#[instrument(level = "info", skip_all, fields(policy = ?policy, sections = map.sections.len()))]
pub async fn run<F, S, B>(
    factory: &F,
    config: &Config,
    store: &S,
    batch: &B,
    map: &SectionMap,
    policy: DetectionPolicy,
) -> RunReport
where
    F: SessionFactory,
    S: ArticleStore,
    B: SummaryBatch,
{
    let started_at = Utc::now();

    let tasks = collect_tasks(factory, config, store, map, policy).await;
    info!(tasks = tasks.len(), "Detection phase complete");

    let results: Vec<TaskResult> = stream::iter(tasks)
        .map(|task| async move {
            let outcome = process_task(factory, config, store, &task).await;
            TaskResult { task, outcome }
        })
        .buffer_unordered(config.workers.extraction.max(1))
        .collect()
        .await;

    let mut report = RunReport {
        started_at,
        finished_at: started_at,
        policy,
        sections: map.sections.len(),
        leaf_sections: map.leaf_count(),
        attempted: results.len(),
        stored: 0,
        duplicates: 0,
        failed: Vec::new(),
    };
    for TaskResult { task, outcome } in results {
        match outcome {
            TaskOutcome::Stored => report.stored += 1,
            TaskOutcome::Duplicate => report.duplicates += 1,
            TaskOutcome::Failed { stage, reason } => report.failed.push(FailedTask {
                article_url: task.article_url,
                section: task.section,
                category: task.category,
                stage,
                reason,
            }),
        }
    }
    info!(
        attempted = report.attempted,
        stored = report.stored,
        duplicates = report.duplicates,
        failed = report.failed.len(),
        "Extraction phase complete"
    );

    if let Err(e) = batch.run().await {
        error!(error = %e, "Summary batch failed");
    }

    report.finished_at = Utc::now();
    report
}

/// Phase 1: new article tasks for every leaf section, deduplicated by URL.
///
/// Results come back in section map order, so an article listed under two
/// sections always belongs to the first one.
async fn collect_tasks<F, S>(
    factory: &F,
    config: &Config,
    store: &S,
    map: &SectionMap,
    policy: DetectionPolicy,
) -> Vec<ArticleTask>
where
    F: SessionFactory,
    S: ArticleStore,
{
    let per_section: Vec<Vec<ArticleTask>> = stream::iter(&map.sections)
        .map(|(section, leaves)| async move {
            let mut tasks = Vec::new();
            for leaf in leaves {
                tasks.extend(detect_leaf(factory, config, store, section, leaf, policy).await);
            }
            tasks
        })
        .buffered(config.workers.detection.max(1))
        .collect()
        .await;

    let mut seen = HashSet::new();
    per_section
        .into_iter()
        .flatten()
        .filter(|task| seen.insert(task.article_url.clone()))
        .collect()
}

async fn detect_leaf<F, S>(
    factory: &F,
    config: &Config,
    store: &S,
    section: &str,
    leaf: &str,
    policy: DetectionPolicy,
) -> Vec<ArticleTask>
where
    F: SessionFactory,
    S: ArticleStore,
{
    let leaf_url = clean_url(leaf);
    let category = last_path_segment(&leaf_url).unwrap_or_else(|| leaf_url.clone());

    let cutoff = match policy {
        DetectionPolicy::Membership => Cutoff::Membership,
        DetectionPolicy::Watermark => match store.latest_published_at(&category).await {
            Ok(watermark) => Cutoff::Watermark(watermark),
            Err(e) => {
                warn!(%category, error = %e, "Watermark lookup failed; scanning without one");
                Cutoff::Watermark(None)
            }
        },
    };

    detector::new_articles(factory, config, store, &leaf_url, cutoff)
        .await
        .into_iter()
        .map(|article_url| ArticleTask {
            section: section.to_string(),
            category: category.clone(),
            article_url,
        })
        .collect()
}

/// Phase 2 for one article. Never fails; errors become [`TaskOutcome::Failed`].
#[instrument(level = "info", skip(factory, config, store, task), fields(url = %task.article_url))]
async fn process_task<F, S>(factory: &F, config: &Config, store: &S, task: &ArticleTask) -> TaskOutcome
where
    F: SessionFactory,
    S: ArticleStore,
{
    debug!(state = "pending");
    let outcome = match fetch_article(factory, config, &task.article_url).await {
        Err(e) => TaskOutcome::Failed {
            stage: Stage::Fetch,
            reason: e.to_string(),
        },
        Ok((paywalled, content)) => {
            debug!(state = "extracting", tier = content.tier.level());
            match extract::extract(task, &content, paywalled, Utc::now()) {
                Err(e) => TaskOutcome::Failed {
                    stage: Stage::Extract,
                    reason: e.to_string(),
                },
                Ok(record) => match store.insert(&record).await {
                    Ok(InsertOutcome::Inserted) => TaskOutcome::Stored,
                    Ok(InsertOutcome::Duplicate) => TaskOutcome::Duplicate,
                    Err(e) => TaskOutcome::Failed {
                        stage: Stage::Store,
                        reason: e.to_string(),
                    },
                },
            }
        }
    };

    match &outcome {
        TaskOutcome::Stored => debug!(state = "stored"),
        TaskOutcome::Duplicate => debug!(state = "stored", duplicate = true),
        TaskOutcome::Failed { stage, reason } => {
            warn!(url = %task.article_url, %stage, %reason, state = "failed", "Article task failed");
        }
    }
    outcome
}

/// Classify and fetch over one session, dropped before extraction starts.
async fn fetch_article<F: SessionFactory>(
    factory: &F,
    config: &Config,
    article_url: &str,
) -> FetchResult<(bool, FetchedContent)> {
    let mut session = factory.open().await?;
    debug!(state = "fetching");
    let paywalled = paywall::classify(&mut session, config, article_url).await;
    debug!(state = "classified", paywalled);
    let content = if paywalled {
        paywall::fetch_paywalled(&mut session, config, article_url).await?
    } else {
        paywall::fetch_free(&mut session, config, article_url).await?
    };
    Ok((paywalled, content))
}
