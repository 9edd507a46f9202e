//! Command-line interface definitions for the crawler.
//!
//! Flags that overlap with the YAML config file take precedence over it.
//! `GEMINI_API_KEY` is not read here; the summary command inherits it from
//! the environment.

use clap::Parser;

use crate::swarm::DetectionPolicy;

/// Command-line arguments for one crawl run.
///
/// # Examples
///
/// ```sh
/// # Crawl with defaults, rediscovering sections only when the map is stale
/// ft_crawler
///
/// # Watermark detection against a specific database
/// ft_crawler --policy watermark --db-url ./data/ft.db
///
/// # Refresh the section map and stop
/// ft_crawler --force-discovery --discover-only
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path of the persisted section map (JSON)
    #[arg(short, long, default_value = "data/sections.json")]
    pub sections_file: String,

    /// Path of the SQLite article database
    #[arg(long, env = "DB_URL", default_value = "data/articles.db")]
    pub db_url: String,

    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Directory for per-run JSON reports
    #[arg(short, long, default_value = "reports")]
    pub report_dir: String,

    /// Directory for recent-article digests
    #[arg(short, long, default_value = "digests")]
    pub digest_dir: String,

    /// How new articles are detected in a section stream
    #[arg(short, long, value_enum, default_value_t = DetectionPolicy::Membership)]
    pub policy: DetectionPolicy,

    /// Rediscover sections even if the map is fresh
    #[arg(long)]
    pub force_discovery: bool,

    /// Stop after the section map is up to date
    #[arg(long)]
    pub discover_only: bool,

    /// Shell command run after each crawl with DIGEST_PATH set
    #[arg(long, env = "SUMMARY_COMMAND")]
    pub summary_command: Option<String>,

    /// Override the site base URL from the config file
    #[arg(long)]
    pub base_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(&["ft_crawler"]);

        assert_eq!(cli.sections_file, "data/sections.json");
        assert_eq!(cli.report_dir, "reports");
        assert_eq!(cli.policy, DetectionPolicy::Membership);
        assert!(!cli.force_discovery);
        assert!(!cli.discover_only);
        assert!(cli.base_url.is_none());
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(&[
            "ft_crawler",
            "--sections-file",
            "/tmp/sections.json",
            "--db-url",
            "/tmp/ft.db",
            "--policy",
            "watermark",
            "--force-discovery",
            "--summary-command",
            "python summarize.py",
            "--base-url",
            "https://example.test",
        ]);

        assert_eq!(cli.sections_file, "/tmp/sections.json");
        assert_eq!(cli.db_url, "/tmp/ft.db");
        assert_eq!(cli.policy, DetectionPolicy::Watermark);
        assert!(cli.force_discovery);
        assert_eq!(cli.summary_command.as_deref(), Some("python summarize.py"));
        assert_eq!(cli.base_url.as_deref(), Some("https://example.test"));
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(&[
            "ft_crawler",
            "-s",
            "s.json",
            "-c",
            "config.yaml",
            "-r",
            "/tmp/reports",
            "-d",
            "/tmp/digests",
            "-p",
            "membership",
        ]);

        assert_eq!(cli.sections_file, "s.json");
        assert_eq!(cli.config.as_deref(), Some("config.yaml"));
        assert_eq!(cli.report_dir, "/tmp/reports");
        assert_eq!(cli.digest_dir, "/tmp/digests");
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        assert!(Cli::try_parse_from(&["ft_crawler", "--policy", "newest"]).is_err());
    }
}
