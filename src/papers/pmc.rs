//! PubMed Central (PMC) repository access
//!
//! Article pages live at `{base}/pmc/articles/PMC{id}/`. A page either links
//! its PDF directly (`citation_pdf_url` meta tag, or the `pdf-link` entry of
//! the format menu) or only offers the printable view.

use std::sync::LazyLock;

use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::debug;

use super::absolutize;
use super::locator::{RepositoryEntry, RepositoryLookup};
use crate::error::{MinerError, Result};

static PMCID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)pmc(\d+)").expect("valid PMCID regex"));

static PDF_META: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("meta[name='citation_pdf_url']").expect("valid selector")
});
static PDF_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("li.pdf-link a[href], a.pdf-link[href], a[data-ga-label='pdf_download_desktop']")
        .expect("valid selector")
});

/// Extract PMCID digits from various identifier formats
///
/// Handles:
/// - `PMC8901234` → `8901234`
/// - `pmc8901234` → `8901234` (case-insensitive)
/// - `https://www.ncbi.nlm.nih.gov/pmc/articles/PMC8901234/` → `8901234`
pub fn extract_pmcid(identifiers: &[String]) -> Option<String> {
    identifiers
        .iter()
        .find_map(|id| PMCID_PATTERN.captures(id))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Canonical `PMC{digits}` form; bare digits are accepted
pub fn normalize_pmcid(id: &str) -> Option<String> {
    let id = id.trim();
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("PMC{}", id));
    }
    extract_pmcid(&[id.to_string()]).map(|digits| format!("PMC{}", digits))
}

/// Direct document link on an article page, made absolute
pub fn document_link_in(html: &str, page_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let from_meta = document
        .select(&PDF_META)
        .filter_map(|m| m.value().attr("content"))
        .find_map(|href| absolutize(page_url, href));
    from_meta.or_else(|| {
        document
            .select(&PDF_LINKS)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| absolutize(page_url, href))
    })
}

pub struct PmcClient {
    client: Client,
    base_url: String,
}

impl PmcClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Article page URL, or an error for an unrecognizable id
    pub fn article_url(&self, pmcid: &str) -> Result<String> {
        let pmcid = normalize_pmcid(pmcid)
            .ok_or_else(|| MinerError::Parse(format!("not a PMCID: {}", pmcid)))?;
        Ok(format!("{}/pmc/articles/{}/", self.base_url, pmcid))
    }

    /// Download an article page's HTML
    pub async fn fetch_article_html(&self, pmcid: &str) -> Result<String> {
        let url = self.article_url(pmcid)?;
        let (_, body) = super::fetch_page(&self.client, &url).await?;
        Ok(body)
    }

    /// Article page's final URL and HTML, `None` when the repository has no such entry
    pub async fn fetch_article(&self, pmcid: &str) -> Result<Option<(String, String)>> {
        let url = self.article_url(pmcid)?;
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(MinerError::status(&url, response.status()));
        }
        let final_url = response.url().to_string();
        Ok(Some((final_url, response.text().await?)))
    }
}

impl RepositoryLookup for PmcClient {
    fn fetch_entry<'a>(&'a self, repository_id: &'a str) -> BoxFuture<'a, Result<RepositoryEntry>> {
        async move {
            let Some((page_url, html)) = self.fetch_article(repository_id).await? else {
                debug!(repository_id, "repository entry missing");
                return Ok(RepositoryEntry::Missing);
            };
            Ok(RepositoryEntry::Found {
                document_url: document_link_in(&html, &page_url),
            })
        }
        .boxed()
    }

    fn printable_url(&self, repository_id: &str) -> String {
        let pmcid = normalize_pmcid(repository_id).unwrap_or_else(|| repository_id.to_string());
        format!("{}/pmc/articles/{}/?report=printable", self.base_url, pmcid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_pmcid() {
        assert_eq!(
            extract_pmcid(&["PMC8901234".to_string()]),
            Some("8901234".to_string())
        );
        assert_eq!(
            extract_pmcid(&["pmc8901234".to_string()]),
            Some("8901234".to_string())
        );
        assert_eq!(
            extract_pmcid(&["https://www.ncbi.nlm.nih.gov/pmc/articles/PMC8901234/".to_string()]),
            Some("8901234".to_string())
        );
    }

    #[test]
    fn test_extract_pmcid_no_match() {
        assert_eq!(extract_pmcid(&["doi:10.1234/example".to_string()]), None);
        assert_eq!(extract_pmcid(&["PM12345".to_string()]), None);
        assert_eq!(extract_pmcid(&[]), None);
    }

    #[test]
    fn test_extract_pmcid_multiple_identifiers() {
        assert_eq!(
            extract_pmcid(&[
                "doi:10.1234/example".to_string(),
                "PMC8901234".to_string(),
            ]),
            Some("8901234".to_string())
        );
    }

    #[test]
    fn test_normalize_pmcid() {
        assert_eq!(normalize_pmcid("8901234").as_deref(), Some("PMC8901234"));
        assert_eq!(normalize_pmcid(" pmc77 ").as_deref(), Some("PMC77"));
        assert_eq!(normalize_pmcid("10.1/x"), None);
    }

    #[test]
    fn test_urls() {
        let pmc = PmcClient::new(Client::new(), "https://www.ncbi.nlm.nih.gov/");
        assert_eq!(
            pmc.article_url("6543210").unwrap(),
            "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC6543210/"
        );
        assert_eq!(
            pmc.printable_url("PMC6543210"),
            "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC6543210/?report=printable"
        );
        assert!(pmc.article_url("none").is_err());
    }

    #[test]
    fn test_document_link_prefers_meta() {
        let html = r#"<html><head>
            <meta name="citation_pdf_url" content="https://www.ncbi.nlm.nih.gov/pmc/articles/PMC1/pdf/main.pdf">
            </head><body><ul><li class="pdf-link"><a href="/pmc/articles/PMC1/pdf/other.pdf">PDF</a></li></ul></body></html>"#;
        assert_eq!(
            document_link_in(html, "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC1/").as_deref(),
            Some("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC1/pdf/main.pdf")
        );
    }

    #[test]
    fn test_document_link_from_format_menu() {
        let html = r#"<ul class="format-menu"><li class="pdf-link other_item">
            <a href="/pmc/articles/PMC1/pdf/jama.pdf" class="int-view">PDF (1.2M)</a></li></ul>"#;
        assert_eq!(
            document_link_in(html, "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC1/").as_deref(),
            Some("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC1/pdf/jama.pdf")
        );
        assert_eq!(document_link_in("<p>No links</p>", "https://www.ncbi.nlm.nih.gov/"), None);
    }
}
