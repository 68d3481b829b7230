//! DOI landing pages
//!
//! Resolves a DOI through the resolver (`{base}/{doi}`), follows the
//! redirects to the publisher and collects every outbound link.

use std::sync::LazyLock;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use scraper::{Html, Selector};

use super::locator::{LandingPage, LandingPageFetcher};
use crate::error::Result;

static LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Every non-empty `href` on a page, in document order
pub fn page_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&LINKS)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with('#'))
        .map(String::from)
        .collect()
}

pub struct DoiResolverClient {
    client: Client,
    base_url: String,
}

impl DoiResolverClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl LandingPageFetcher for DoiResolverClient {
    fn landing_page<'a>(&'a self, doi: &'a str) -> BoxFuture<'a, Result<LandingPage>> {
        async move {
            let url = format!("{}/{}", self.base_url, doi.trim());
            let (final_url, html) = super::fetch_page(&self.client, &url).await?;
            Ok(LandingPage {
                url: final_url,
                links: page_links(&html),
            })
        }
        .boxed()
    }
}
