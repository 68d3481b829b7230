//! Supplementary material discovery
//!
//! Lists the supplementary files of a repository article whose caption
//! suggests quality assessment, search strategy or bias analyses. Those are
//! the documents the table miner runs over.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::absolutize;
use super::article::plain_text;

/// Caption words that mark a supplement worth mining (case-insensitive)
pub const SUPPLEMENT_KEYWORDS: &[&str] = &[
    "quality",
    "assess",
    "assessment",
    "risk",
    "bias",
    "publication",
    "search",
    "funnel",
    "forest",
    "newcastle",
    "ottawa",
    "strobe",
    "prisma",
];

static ITEMS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "dd#data-suppmats > div, section#data-supplementary-material section.sm, div.sup-box, section.sm",
    )
    .expect("valid selector")
});
static CAPTIONS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.caption, .caption, .label, .sm-title").expect("valid selector"));
static DOWNLOADS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[data-ga-action='click_feat_suppl'], a[href]").expect("valid selector")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplementLink {
    pub caption: String,
    pub url: String,
}

/// True when a caption mentions any supplement keyword
pub fn is_relevant_caption(caption: &str) -> bool {
    let lower = caption.to_lowercase();
    SUPPLEMENT_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn item_caption(item: &ElementRef<'_>) -> String {
    let parts: Vec<String> = item
        .select(&CAPTIONS)
        .map(|c| plain_text(&c))
        .filter(|t| !t.is_empty())
        .collect();
    if parts.is_empty() {
        plain_text(item)
    } else {
        parts.join(" ")
    }
}

/// Relevant supplementary files of an article page, with absolute URLs
pub fn supplementary_links(html: &str, page_url: &str) -> Vec<SupplementLink> {
    let document = Html::parse_document(html);
    let mut links: Vec<SupplementLink> = Vec::new();

    for item in document.select(&ITEMS) {
        let caption = item_caption(&item);
        if !is_relevant_caption(&caption) {
            continue;
        }
        let Some(url) = item
            .select(&DOWNLOADS)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| absolutize(page_url, href))
        else {
            continue;
        };
        if links.iter().any(|l| l.url == url) {
            continue;
        }
        links.push(SupplementLink { caption, url });
    }

    links
}
