//! PubMed identifiers and the E-utilities DOI lookup
//!
//! API endpoint: {eutils}/efetch.fcgi?db=pubmed&id={pmid}&retmode=xml
//! Without an API key NCBI allows 3 requests/second.

use std::sync::LazyLock;

use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use reqwest::Client;

use super::locator::DoiLookup;
use crate::error::Result;

static DOI_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"10\.\d{4,9}/[^\s"<>]+"#).expect("valid DOI regex"));
static PMID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:pubmed(?:\.ncbi\.nlm\.nih\.gov)?/|PMID:?\s*)(\d{1,9})\b").expect("valid PMID regex")
});
static ELOCATION_DOI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<ELocationID EIdType="doi"[^>]*>\s*([^<\s]+)\s*</ELocationID>"#).expect("valid efetch regex")
});
static ARTICLE_ID_DOI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<ArticleId IdType="doi">\s*([^<\s]+)\s*</ArticleId>"#).expect("valid efetch regex")
});

/// First DOI in a string, with trailing punctuation stripped
pub fn extract_doi(text: &str) -> Option<String> {
    DOI_PATTERN.find(text).map(|m| {
        m.as_str()
            .trim_end_matches(['.', ',', ';', ':', ')', ']'])
            .to_string()
    })
}

/// First PMID in a PubMed link or a `PMID: n` mention
pub fn extract_pmid(text: &str) -> Option<String> {
    PMID_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// The article's own DOI in an efetch PubMed XML record.
///
/// Cited works in `<ReferenceList>` carry DOIs too; everything from the
/// first reference list on is ignored.
pub fn doi_from_efetch(xml: &str) -> Option<String> {
    let own = xml.find("<ReferenceList").map_or(xml, |end| &xml[..end]);
    [&*ELOCATION_DOI, &*ARTICLE_ID_DOI]
        .into_iter()
        .find_map(|pattern| pattern.captures(own))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub struct PubmedClient {
    client: Client,
    eutils_base_url: String,
    api_key: Option<String>,
}

impl PubmedClient {
    pub fn new(client: Client, eutils_base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            eutils_base_url: eutils_base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn efetch_url(&self, pmid: &str) -> String {
        let mut url = format!(
            "{}/efetch.fcgi?db=pubmed&id={}&retmode=xml",
            self.eutils_base_url,
            urlencoding::encode(pmid.trim())
        );
        if let Some(key) = &self.api_key {
            url.push_str("&api_key=");
            url.push_str(&urlencoding::encode(key));
        }
        url
    }
}

impl DoiLookup for PubmedClient {
    fn doi_for_pmid<'a>(&'a self, pmid: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        async move {
            let (_, xml) = super::fetch_page(&self.client, &self.efetch_url(pmid)).await?;
            Ok(doi_from_efetch(&xml))
        }
        .boxed()
    }
}
