//! Homepage scrapers for outlets without a usable feed.
//!
//! Each registered scraper downloads the outlet's front page and reads
//! article teasers out of the markup. Teasers are `<article>` elements, or
//! `div.article-item`/`div.news-item` when a page has none.
//!
//! # Registered Scrapers
//!
//! | Key | Outlet | Homepage |
//! |-----|--------|----------|
//! | `origo` | Origo | <https://www.origo.hu> |
//! | `888` | 888 | <https://888.hu> |
//!
//! Homepages carry no reliable timestamps, so every article is stamped with
//! the scrape time.

use crate::models::Article;
use crate::utils::truncate_chars;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::error::Error;
use tracing::{debug, info, instrument};
use url::Url;

/// Teasers shorter than this are navigation links, not headlines.
pub const MIN_TITLE_CHARS: usize = 10;

const MAX_SUMMARY_CHARS: usize = 500;

static TEASER: Lazy<Selector> = Lazy::new(|| Selector::parse("article").expect("valid teaser selector"));
static FALLBACK_TEASER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.article-item, div.news-item").expect("valid fallback selector"));
static HEADLINE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1, h2, h3, h4, a").expect("valid headline selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));
static LEAD: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".summary, .lead, .description, .excerpt").expect("valid lead selector")
});

/// A site-specific scraper known by its configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomepageScraper {
    /// Value of `scraper:` in the source configuration.
    pub key: &'static str,
    /// Default source name when the configuration does not override it.
    pub outlet: &'static str,
    pub homepage: &'static str,
}

/// Scraper registration table.
pub const HOMEPAGE_SCRAPERS: &[HomepageScraper] = &[
    HomepageScraper {
        key: "origo",
        outlet: "Origo",
        homepage: "https://www.origo.hu",
    },
    HomepageScraper {
        key: "888",
        outlet: "888",
        homepage: "https://888.hu",
    },
];

impl HomepageScraper {
    /// Look a scraper up by its configuration key.
    pub fn by_key(key: &str) -> Option<&'static HomepageScraper> {
        HOMEPAGE_SCRAPERS.iter().find(|s| s.key.eq_ignore_ascii_case(key.trim()))
    }

    /// Download the homepage and extract up to `max_articles` teasers.
    #[instrument(level = "info", skip_all, fields(scraper = self.key, %source))]
    pub async fn fetch(&self, client: &Client, source: &str, max_articles: usize) -> Result<Vec<Article>, Box<dyn Error>> {
        let base = Url::parse(self.homepage)?;
        let html = client.get(base.clone()).send().await?.error_for_status()?.text().await?;
        let articles = parse_homepage(&html, &base, source, max_articles, Local::now());
        info!(count = articles.len(), "Scraped homepage articles");
        Ok(articles)
    }
}

/// Extract teaser articles from homepage markup.
///
/// Links are resolved against `base`; non-http(s) links and repeats are
/// skipped. At most `max_articles` are returned, in page order.
pub fn parse_homepage(html: &str, base: &Url, source: &str, max_articles: usize, now: DateTime<Local>) -> Vec<Article> {
    let document = Html::parse_document(html);
    let mut teasers: Vec<ElementRef> = document.select(&TEASER).collect();
    if teasers.is_empty() {
        debug!("No <article> elements; trying fallback teaser selector");
        teasers = document.select(&FALLBACK_TEASER).collect();
    }

    let mut seen = HashSet::new();
    let mut articles = Vec::new();
    for teaser in teasers {
        if articles.len() >= max_articles {
            break;
        }
        let Some(title) = teaser.select(&HEADLINE).map(element_text).find(|t| !t.is_empty()) else {
            continue;
        };
        if title.chars().count() < MIN_TITLE_CHARS {
            continue;
        }
        let Some(link) = teaser
            .select(&LINK)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| resolve_link(base, href))
        else {
            continue;
        };
        if !seen.insert(link.clone()) {
            continue;
        }
        let summary = teaser
            .select(&LEAD)
            .map(element_text)
            .find(|t| !t.is_empty())
            .map(|t| truncate_chars(&t, MAX_SUMMARY_CHARS).to_string());

        articles.push(Article {
            source: source.to_string(),
            title,
            link,
            summary,
            published: Some(now),
        });
    }
    articles
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let url = base.join(href.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}
