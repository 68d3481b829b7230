//! Article-side evidence: included studies and where to read them
//!
//! - `article`: repository article HTML parsed into owned data
//! - `study_index`: which reference-list entries are included studies
//! - `locator`: ordered fallback chain to a full-text document
//! - `pmc`, `pubmed`, `mirror`, `publisher`, `scholar`: HTTP collaborators for the chain
//! - `supplements`: supplementary material links worth mining

pub mod article;
pub mod locator;
pub mod mirror;
pub mod pmc;
pub mod publisher;
pub mod pubmed;
pub mod scholar;
pub mod study_index;
pub mod supplements;

use std::time::Duration;

use reqwest::Client;

use crate::error::{MinerError, Result};

pub use article::ParsedArticle;
pub use locator::{SourceLocator, SourceQuery};
pub use study_index::{citations_for, resolve_citations, resolve_study_indices};

/// Browser-like user agent; several hosts in the chain refuse library agents
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_11_5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/50.0.2661.102 Safari/537.36";

/// Build the shared async client for source lookups
pub fn http_client(timeout_secs: u64, user_agent: &str) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(MinerError::from)
}

/// GET a page and return its final URL and body; non-success statuses are errors
pub(crate) async fn fetch_page(client: &Client, url: &str) -> Result<(String, String)> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(MinerError::status(url, response.status()));
    }
    let final_url = response.url().to_string();
    let body = response.text().await?;
    Ok((final_url, body))
}

/// Make `link` absolute against `base`, accepting protocol-relative links
pub(crate) fn absolutize(base: &str, link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    if let Some(rest) = link.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    match url::Url::parse(link) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(_) => url::Url::parse(base).ok()?.join(link).ok().map(|u| u.to_string()),
    }
}
