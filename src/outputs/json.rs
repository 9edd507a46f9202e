//! JSON files written and read by the crawler.
//!
//! # Output Structure
//!
//! ```text
//! sections.json                       # persisted SectionMap
//! report_dir/
//! └── 2025-08-26T13-05-00Z.json       # one RunReport per run
//! digest_dir/
//! └── 2025-08-26/
//!     └── 13-05-02.json               # one Digest per run
//! ```

use chrono::{DateTime, Utc};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

use crate::digest::Digest;
use crate::models::SectionMap;
use crate::swarm::RunReport;

/// Read the persisted section map.
///
/// Returns `Ok(None)` when the file does not exist yet; a file that exists
/// but does not parse is an error.
#[instrument(level = "info")]
pub async fn load_section_map(path: &str) -> Result<Option<SectionMap>, Box<dyn Error>> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No section map on disk");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let map: SectionMap = serde_json::from_str(&raw)?;
    info!(
        last_update = %map.last_update,
        sections = map.sections.len(),
        leaves = map.leaf_count(),
        "Loaded section map"
    );
    Ok(Some(map))
}

/// Write the section map, pretty-printed.
#[instrument(level = "info", skip(map))]
pub async fn write_section_map(map: &SectionMap, path: &str) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(map)?;
    fs::write(path, json).await?;
    info!(leaves = map.leaf_count(), "Wrote section map");
    Ok(())
}

/// Write a [`RunReport`] to `{report_dir}/{finished_at}.json` and return the
/// path.
#[instrument(level = "info", skip_all, fields(report_dir = %report_dir))]
pub async fn write_run_report(report: &RunReport, report_dir: &str) -> Result<String, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;
    let path = format!(
        "{}/{}.json",
        report_dir,
        report.finished_at.format("%Y-%m-%dT%H-%M-%SZ")
    );
    info!(path = %path, "Writing run report");
    fs::write(&path, json).await?;
    Ok(path)
}

/// Write a [`Digest`] under a per-day directory and return the path.
///
/// The file path is `{digest_dir}/{date}/{time}.json`, both taken from `now`
/// in UTC.
#[instrument(level = "info", skip_all, fields(digest_dir = %digest_dir))]
pub async fn write_digest(
    digest: &Digest,
    digest_dir: &str,
    now: DateTime<Utc>,
) -> Result<String, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(digest)?;

    let full_dir = format!("{}/{}", digest_dir, now.format("%Y-%m-%d"));
    info!(%full_dir, "Ensuring digest directory exists");
    if let Err(e) = fs::create_dir_all(&full_dir).await {
        error!(%full_dir, error = %e, "Failed to create digest dir");
        return Err(e.into());
    }

    let path = format!("{}/{}.json", full_dir, now.format("%H-%M-%S"));
    fs::write(&path, json).await?;
    info!(path = %path, "Wrote digest");
    Ok(path)
}
