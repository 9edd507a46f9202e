//! File outputs of a crawl run.
//!
//! # Submodules
//!
//! - [`json`]: the persisted section map, the per-run report and the
//!   recent-articles digest

pub mod json;
