//! Site scrapers for the crawl pipeline.
//!
//! Each stage takes a [`SessionFactory`](crate::fetch::SessionFactory) or an
//! open [`Session`](crate::fetch::Session) plus the [`Config`](crate::config::Config),
//! and never lets a page-level failure escape past the declared
//! [failure policy](crate::policy).
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Section discovery | [`discovery`] | [`SectionMap`](crate::models::SectionMap) of leaf section URLs |
//! | New-article detection | [`detector`] | new article URLs for one leaf section |
//! | Paywall resolution | [`paywall`] | article HTML tagged with its [`Tier`](crate::models::Tier) |
//! | Field extraction | [`extract`] | [`ArticleRecord`](crate::models::ArticleRecord) |

pub mod detector;
pub mod discovery;
pub mod extract;
pub mod paywall;
