//! Field extraction from fetched article HTML.
//!
//! Canonical pages and the primary bypass service share the site's own
//! article markup, so both go through [`extract_canonical`]. Archival
//! snapshots flatten the original class names away; [`extract_archive`]
//! works from element structure alone.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::error::{FetchError, FetchResult};
use crate::fetch::element_text;
use crate::models::{ArticleRecord, ArticleTask, FetchedContent, Figure, Media, Tier};
use crate::utils::parse_timestamp;

fn sel(s: &str) -> Selector {
    Selector::parse(s).expect("static selector")
}

static PRIMARY_THEME: Lazy<Selector> = Lazy::new(|| sel("div.topper__primary-theme span"));
static HEADLINE: Lazy<Selector> = Lazy::new(|| sel("h1.o-topper__headline"));
static STANDFIRST: Lazy<Selector> = Lazy::new(|| sel("div.o-topper__standfirst"));
static BYLINE: Lazy<Selector> = Lazy::new(|| sel("p.article-info__byline"));
static PUBLISHED: Lazy<Selector> = Lazy::new(|| sel("time.article-info__timestamp"));
static UPDATED: Lazy<Selector> = Lazy::new(|| sel("p.article-info__updated-timestamp time"));
static BODY: Lazy<Selector> = Lazy::new(|| sel("article#article-body"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| sel("p"));
static FIGURE: Lazy<Selector> = Lazy::new(|| sel("figure"));
static IMG: Lazy<Selector> = Lazy::new(|| sel("img"));
static FIGCAPTION: Lazy<Selector> = Lazy::new(|| sel("figcaption"));
static ANY_HEADLINE: Lazy<Selector> = Lazy::new(|| sel("h1"));
static ANY_TIME: Lazy<Selector> = Lazy::new(|| sel("time[datetime]"));
static ANY_IMG: Lazy<Selector> = Lazy::new(|| sel("img[src]"));

/// Turn fetched HTML into an [`ArticleRecord`] for `task`.
///
/// Fails with [`FetchError::Parse`] when the page yields neither a headline
/// nor any body text.
pub fn extract(
    task: &ArticleTask,
    content: &FetchedContent,
    paywall: bool,
    scraped_at: DateTime<Utc>,
) -> FetchResult<ArticleRecord> {
    let doc = Html::parse_fragment(&content.html);
    let fields = match content.tier {
        Tier::Free | Tier::Bypass => extract_canonical(&doc),
        Tier::Archive => extract_archive(&doc),
    };

    if fields.headline.is_none() && fields.content.is_empty() {
        return Err(FetchError::Parse(format!(
            "no headline or body text in {} content from {}",
            tier_name(content.tier),
            content.fetched_from
        )));
    }

    Ok(ArticleRecord {
        article_id: task.article_url.clone(),
        scraped_at,
        paywall,
        tier: content.tier,
        section: task.section.clone(),
        category: task.category.clone(),
        primary_theme: fields.primary_theme,
        headline: fields.headline,
        standfirst: fields.standfirst,
        byline: fields.byline,
        published_at: fields.published_at,
        updated_at: fields.updated_at,
        content: fields.content,
        media: Media {
            images: fields.images,
        },
    })
}

fn tier_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Free => "free",
        Tier::Bypass => "bypass",
        Tier::Archive => "archive",
    }
}

/// Fields pulled out of one article body.
#[derive(Debug, Default)]
pub struct ArticleFields {
    pub primary_theme: Option<String>,
    pub headline: Option<String>,
    pub standfirst: Option<String>,
    pub byline: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub content: Vec<String>,
    pub images: Vec<Figure>,
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
}

fn first_datetime(doc: &Html, selector: &Selector) -> Option<DateTime<Utc>> {
    doc.select(selector)
        .next()
        .and_then(|el| el.value().attr("datetime"))
        .and_then(parse_timestamp)
}

fn paragraphs(root: ElementRef<'_>) -> Vec<String> {
    root.select(&PARAGRAPH)
        .map(|p| element_text(&p))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Site markup: topper, article-info block, `article#article-body`, figures.
pub fn extract_canonical(doc: &Html) -> ArticleFields {
    let content = doc
        .select(&BODY)
        .next()
        .map(paragraphs)
        .unwrap_or_default();

    let images = doc
        .select(&FIGURE)
        .map(|fig| {
            let img_src = fig
                .select(&IMG)
                .next()
                .and_then(|img| img.value().attr("src"))
                .map(str::to_string);
            let caption = fig.select(&FIGCAPTION).next().map(|c| element_text(&c));
            Figure::from_caption(img_src, caption.as_deref())
        })
        .collect();

    ArticleFields {
        primary_theme: first_text(doc, &PRIMARY_THEME),
        headline: first_text(doc, &HEADLINE),
        standfirst: first_text(doc, &STANDFIRST),
        byline: first_text(doc, &BYLINE),
        published_at: first_datetime(doc, &PUBLISHED),
        updated_at: first_datetime(doc, &UPDATED),
        content,
        images,
    }
}

/// Archival snapshot: the first `h1` is the headline, the first dated `time`
/// the publication date, every non-empty `p` a paragraph, and every image a
/// figure whose `alt` text doubles as its caption.
pub fn extract_archive(doc: &Html) -> ArticleFields {
    let root = doc.root_element();
    let images = doc
        .select(&ANY_IMG)
        .map(|img| {
            let src = img.value().attr("src").map(str::to_string);
            Figure::from_caption(src, img.value().attr("alt"))
        })
        .collect();

    ArticleFields {
        headline: first_text(doc, &ANY_HEADLINE),
        published_at: first_datetime(doc, &ANY_TIME),
        content: paragraphs(root),
        images,
        ..ArticleFields::default()
    }
}
