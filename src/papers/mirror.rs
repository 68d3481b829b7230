//! Document mirror lookup
//!
//! Mirror pages for a DOI live at `{base}/{doi}` and show the document in an
//! `<embed>` (or, on some mirrors, an `<iframe>`) viewer.

use std::sync::LazyLock;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use scraper::{Html, Selector};

use super::absolutize;
use super::locator::MirrorLookup;
use crate::error::Result;

static VIEWERS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("embed[src], iframe[src]").expect("valid selector"));

/// Address of the embedded document viewer on a mirror page
pub fn embedded_document(html: &str, page_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&VIEWERS)
        .filter_map(|el| el.value().attr("src"))
        .find_map(|src| absolutize(page_url, src))
}

pub struct MirrorClient {
    client: Client,
    base_url: String,
}

impl MirrorClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn page_url(&self, doi: &str) -> String {
        format!("{}/{}", self.base_url, doi.trim())
    }
}

impl MirrorLookup for MirrorClient {
    fn document_for_doi<'a>(&'a self, doi: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        async move {
            let (page_url, html) = super::fetch_page(&self.client, &self.page_url(doi)).await?;
            Ok(embedded_document(&html, &page_url))
        }
        .boxed()
    }
}
