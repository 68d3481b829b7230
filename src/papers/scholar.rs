//! Scholarly search index lookup
//!
//! Queries `{base}/scholar?q={identifier}` and reads the top result. A result
//! with a side document link (`[PDF] host`) reports that link; otherwise the
//! title link is reported.

use std::sync::LazyLock;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use scraper::{Html, Selector};

use super::absolutize;
use super::article::plain_text;
use super::locator::{ScholarSearch, SearchHit};
use crate::error::{MinerError, Result};

static RESULTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.gs_r, div.gs_ri").expect("valid selector"));
static SIDE_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".gs_or_ggsm a[href], .gs_ggs a[href]").expect("valid selector"));
static TITLE_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3 a[href]").expect("valid selector"));

/// Top hit of a search results page
pub fn top_hit(html: &str, page_url: &str) -> Option<SearchHit> {
    let document = Html::parse_document(html);
    let first = document.select(&RESULTS).next()?;
    let link = first
        .select(&SIDE_LINKS)
        .next()
        .or_else(|| first.select(&TITLE_LINKS).next())?;
    Some(SearchHit {
        link_text: plain_text(&link),
        url: absolutize(page_url, link.value().attr("href")?)?,
    })
}

pub struct ScholarClient {
    client: Client,
    base_url: String,
}

impl ScholarClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn search_url(&self, identifier: &str) -> String {
        format!("{}/scholar?q={}", self.base_url, urlencoding::encode(identifier.trim()))
    }
}

impl ScholarSearch for ScholarClient {
    fn top_result<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<Option<SearchHit>>> {
        async move {
            let (page_url, html) = super::fetch_page(&self.client, &self.search_url(identifier)).await?;
            Ok(top_hit(&html, &page_url))
        }
        .boxed()
    }

    fn follow_redirects<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String>> {
        async move {
            let response = self.client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(MinerError::status(url, response.status()));
            }
            Ok(response.url().to_string())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_hit_prefers_side_document_link() {
        let html = r#"<div id="gs_res_ccl_mid">
            <div class="gs_r gs_or gs_scl">
              <div class="gs_ggs gs_fl"><div class="gs_or_ggsm">
                <a href="https://www.ncbi.nlm.nih.gov/pmc/articles/PMC1/pdf/a.pdf"><span class="gs_ctg2">[PDF]</span> nih.gov</a>
              </div></div>
              <div class="gs_ri"><h3 class="gs_rt"><a href="https://journal.test/a">Retinopathy in pregnancy</a></h3></div>
            </div>
            <div class="gs_r gs_or gs_scl"><div class="gs_ri"><h3><a href="https://journal.test/b">Other</a></h3></div></div>
            </div>"#;
        let hit = top_hit(html, "https://scholar.test/scholar?q=x").unwrap();
        assert_eq!(hit.link_text, "[PDF] nih.gov");
        assert_eq!(hit.url, "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC1/pdf/a.pdf");
        assert!(hit.indicates_document());
    }

    #[test]
    fn test_top_hit_falls_back_to_title() {
        let html = r#"<div class="gs_r"><div class="gs_ri"><h3 class="gs_rt">
            <a href="/citations?id=7">Cohort study</a></h3></div></div>"#;
        let hit = top_hit(html, "https://scholar.test/scholar?q=x").unwrap();
        assert_eq!(hit.url, "https://scholar.test/citations?id=7");
        assert!(!hit.indicates_document());
    }

    #[test]
    fn test_no_results() {
        assert_eq!(top_hit("<p>Your search did not match any articles.</p>", "https://scholar.test/"), None);
    }

    #[test]
    fn test_search_url_encodes_identifier() {
        let scholar = ScholarClient::new(Client::new(), "https://scholar.test/");
        assert_eq!(scholar.search_url("10.1/x y"), "https://scholar.test/scholar?q=10.1%2Fx%20y");
    }
}
