//! Full-text source locator - ordered fallback chain
//!
//! Tries methods in order of decreasing reliability, stopping at the first hit:
//! 1. Direct repository (document link, else printable view)
//! 2. DOI back-fill from PMID (never resolves on its own)
//! 3. Mirror lookup by DOI
//! 4. Publisher landing page link patterns
//! 5. Scholar search by DOI or PMID
//!
//! Every step fails soft: an error is logged and the next step runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Result;
use crate::model::{Citation, ResolvedSource, SourceMethod};

/// Identifiers of one study, as handed to the locator
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceQuery {
    pub repository_id: Option<String>,
    pub doi: Option<String>,
    pub pmid: Option<String>,
}

impl SourceQuery {
    pub fn from_citation(citation: &Citation) -> Self {
        Self {
            repository_id: citation.pmcid.clone(),
            doi: citation.doi.clone(),
            pmid: citation.pmid.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.repository_id.is_none() && self.doi.is_none() && self.pmid.is_none()
    }
}

// =============================================================================
// Collaborators
// =============================================================================

/// Outcome of looking an entry up in the full-text repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryEntry {
    Missing,
    Found { document_url: Option<String> },
}

pub trait RepositoryLookup: Send + Sync {
    fn fetch_entry<'a>(&'a self, repository_id: &'a str) -> BoxFuture<'a, Result<RepositoryEntry>>;

    /// Printable-view address of an entry
    fn printable_url(&self, repository_id: &str) -> String;
}

pub trait DoiLookup: Send + Sync {
    fn doi_for_pmid<'a>(&'a self, pmid: &'a str) -> BoxFuture<'a, Result<Option<String>>>;
}

pub trait MirrorLookup: Send + Sync {
    /// Embeddable document address for a DOI, if the mirror has one
    fn document_for_doi<'a>(&'a self, doi: &'a str) -> BoxFuture<'a, Result<Option<String>>>;
}

/// A resolved DOI landing page and its outbound links
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LandingPage {
    /// Final address after redirects
    pub url: String,
    pub links: Vec<String>,
}

pub trait LandingPageFetcher: Send + Sync {
    fn landing_page<'a>(&'a self, doi: &'a str) -> BoxFuture<'a, Result<LandingPage>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub link_text: String,
    pub url: String,
}

impl SearchHit {
    /// True when the hit points at a document rather than a landing page
    pub fn indicates_document(&self) -> bool {
        if self.link_text.to_lowercase().contains("[pdf]") {
            return true;
        }
        match Url::parse(&self.url) {
            Ok(url) => url.path().to_lowercase().ends_with(".pdf"),
            Err(_) => self.url.to_lowercase().ends_with(".pdf"),
        }
    }
}

pub trait ScholarSearch: Send + Sync {
    fn top_result<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<Option<SearchHit>>>;

    /// Final address after following the redirect chain
    fn follow_redirects<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String>>;
}

// =============================================================================
// Strategies
// =============================================================================

/// One step of the chain.
///
/// `Ok(None)` means the step did not apply or found nothing. A step may fill
/// in missing identifiers on the query for the steps after it.
pub trait SourceStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn attempt<'a>(&'a self, query: &'a mut SourceQuery) -> BoxFuture<'a, Result<Option<ResolvedSource>>>;
}

pub struct DirectRepository {
    repository: Arc<dyn RepositoryLookup>,
}

impl DirectRepository {
    pub fn new(repository: Arc<dyn RepositoryLookup>) -> Self {
        Self { repository }
    }
}

impl SourceStrategy for DirectRepository {
    fn name(&self) -> &'static str {
        "direct_repository"
    }

    fn attempt<'a>(&'a self, query: &'a mut SourceQuery) -> BoxFuture<'a, Result<Option<ResolvedSource>>> {
        async move {
            let Some(id) = query.repository_id.as_deref() else {
                return Ok(None);
            };
            let source = match self.repository.fetch_entry(id).await? {
                RepositoryEntry::Missing => None,
                RepositoryEntry::Found { document_url: Some(url) } => {
                    Some(ResolvedSource::new(url, SourceMethod::DirectRepository))
                }
                RepositoryEntry::Found { document_url: None } => {
                    debug!(repository_id = id, "no direct document link, using printable view");
                    Some(ResolvedSource::new(
                        self.repository.printable_url(id),
                        SourceMethod::DirectRepository,
                    ))
                }
            };
            Ok(source)
        }
        .boxed()
    }
}

pub struct DoiBackfill {
    lookup: Arc<dyn DoiLookup>,
}

impl DoiBackfill {
    pub fn new(lookup: Arc<dyn DoiLookup>) -> Self {
        Self { lookup }
    }
}

impl SourceStrategy for DoiBackfill {
    fn name(&self) -> &'static str {
        "doi_backfill"
    }

    fn attempt<'a>(&'a self, query: &'a mut SourceQuery) -> BoxFuture<'a, Result<Option<ResolvedSource>>> {
        async move {
            if query.doi.is_some() {
                return Ok(None);
            }
            let Some(pmid) = query.pmid.clone() else {
                return Ok(None);
            };
            if let Some(doi) = self.lookup.doi_for_pmid(&pmid).await? {
                debug!(pmid = %pmid, doi = %doi, "back-filled DOI");
                query.doi = Some(doi);
            }
            Ok(None)
        }
        .boxed()
    }
}

pub struct Mirror {
    mirror: Arc<dyn MirrorLookup>,
}

impl Mirror {
    pub fn new(mirror: Arc<dyn MirrorLookup>) -> Self {
        Self { mirror }
    }
}

impl SourceStrategy for Mirror {
    fn name(&self) -> &'static str {
        "mirror"
    }

    fn attempt<'a>(&'a self, query: &'a mut SourceQuery) -> BoxFuture<'a, Result<Option<ResolvedSource>>> {
        async move {
            let Some(doi) = query.doi.as_deref() else {
                return Ok(None);
            };
            Ok(self
                .mirror
                .document_for_doi(doi)
                .await?
                .map(|url| ResolvedSource::new(url, SourceMethod::Mirror)))
        }
        .boxed()
    }
}

/// Link fragments that mark a publisher's own document download
pub const PUBLISHER_PATTERNS: &[&str] = &[
    "/doi/pdf/",
    "/doi/pdfdirect/",
    "/content/pdf/",
    ".full.pdf",
    "/pdfft",
    "/article/file?",
];

/// First landing-page link matching a publisher pattern, made absolute
pub fn publisher_document_link(page: &LandingPage) -> Option<String> {
    let base = Url::parse(&page.url).ok();
    page.links
        .iter()
        .filter(|link| PUBLISHER_PATTERNS.iter().any(|p| link.contains(p)))
        .find_map(|link| match Url::parse(link) {
            Ok(absolute) => Some(absolute.to_string()),
            Err(_) => base.as_ref()?.join(link).ok().map(|u| u.to_string()),
        })
}

pub struct PublisherPage {
    fetcher: Arc<dyn LandingPageFetcher>,
}

impl PublisherPage {
    pub fn new(fetcher: Arc<dyn LandingPageFetcher>) -> Self {
        Self { fetcher }
    }
}

impl SourceStrategy for PublisherPage {
    fn name(&self) -> &'static str {
        "publisher_page"
    }

    fn attempt<'a>(&'a self, query: &'a mut SourceQuery) -> BoxFuture<'a, Result<Option<ResolvedSource>>> {
        async move {
            let Some(doi) = query.doi.as_deref() else {
                return Ok(None);
            };
            let page = self.fetcher.landing_page(doi).await?;
            Ok(publisher_document_link(&page)
                .map(|url| ResolvedSource::new(url, SourceMethod::PublisherPage)))
        }
        .boxed()
    }
}

pub struct Scholar {
    search: Arc<dyn ScholarSearch>,
}

impl Scholar {
    pub fn new(search: Arc<dyn ScholarSearch>) -> Self {
        Self { search }
    }
}

impl SourceStrategy for Scholar {
    fn name(&self) -> &'static str {
        "scholar_search"
    }

    fn attempt<'a>(&'a self, query: &'a mut SourceQuery) -> BoxFuture<'a, Result<Option<ResolvedSource>>> {
        async move {
            let Some(identifier) = query.doi.as_deref().or(query.pmid.as_deref()) else {
                return Ok(None);
            };
            let Some(hit) = self.search.top_result(identifier).await? else {
                return Ok(None);
            };
            if !hit.indicates_document() {
                debug!(identifier, url = %hit.url, "top search hit is not a document");
                return Ok(None);
            }
            let final_url = self.search.follow_redirects(&hit.url).await?;
            Ok(Some(ResolvedSource::new(final_url, SourceMethod::ScholarSearch)))
        }
        .boxed()
    }
}

// =============================================================================
// Locator
// =============================================================================

/// Attempt and success counts for one strategy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StrategyStats {
    pub name: &'static str,
    pub attempts: u32,
    pub successes: u32,
}

/// Runs the strategy chain and remembers each query's outcome for the run
pub struct SourceLocator {
    strategies: Vec<Box<dyn SourceStrategy>>,
    cache: Mutex<HashMap<SourceQuery, Option<ResolvedSource>>>,
    stats: Mutex<Vec<StrategyStats>>,
}

impl SourceLocator {
    pub fn new(strategies: Vec<Box<dyn SourceStrategy>>) -> Self {
        let stats = strategies
            .iter()
            .map(|s| StrategyStats {
                name: s.name(),
                ..Default::default()
            })
            .collect();
        Self {
            strategies,
            cache: Mutex::new(HashMap::new()),
            stats: Mutex::new(stats),
        }
    }

    /// The standard five-step chain. Mirror and scholar steps are left out
    /// when no service is configured for them.
    pub fn standard(
        repository: Arc<dyn RepositoryLookup>,
        doi_lookup: Arc<dyn DoiLookup>,
        mirror: Option<Arc<dyn MirrorLookup>>,
        landing_pages: Arc<dyn LandingPageFetcher>,
        scholar: Option<Arc<dyn ScholarSearch>>,
    ) -> Self {
        let mut strategies: Vec<Box<dyn SourceStrategy>> = vec![
            Box::new(DirectRepository::new(repository)),
            Box::new(DoiBackfill::new(doi_lookup)),
        ];
        if let Some(mirror) = mirror {
            strategies.push(Box::new(Mirror::new(mirror)));
        }
        strategies.push(Box::new(PublisherPage::new(landing_pages)));
        if let Some(scholar) = scholar {
            strategies.push(Box::new(Scholar::new(scholar)));
        }
        Self::new(strategies)
    }

    /// Strategy names in the order they are tried
    pub fn method_order(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn stats(&self) -> Vec<StrategyStats> {
        lock(&self.stats).clone()
    }

    /// Resolve a query, or `None` when every step comes up empty
    pub async fn locate(&self, query: SourceQuery) -> Option<ResolvedSource> {
        if let Some(cached) = lock(&self.cache).get(&query) {
            debug!(?query, "source cache hit");
            return cached.clone();
        }

        let resolved = self.run_chain(query.clone()).await;
        match &resolved {
            Some(source) => info!(?query, method = source.method.as_str(), url = %source.url, "source resolved"),
            None => info!(?query, "no source found"),
        }
        lock(&self.cache).insert(query, resolved.clone());
        resolved
    }

    async fn run_chain(&self, mut query: SourceQuery) -> Option<ResolvedSource> {
        for (i, strategy) in self.strategies.iter().enumerate() {
            lock(&self.stats)[i].attempts += 1;
            match strategy.attempt(&mut query).await {
                Ok(Some(source)) => {
                    lock(&self.stats)[i].successes += 1;
                    return Some(source);
                }
                Ok(None) => {}
                Err(e) => warn!(step = strategy.name(), error = %e, "source step failed, continuing"),
            }
        }
        None
    }

    pub fn print_summary(&self) {
        println!("\nSource resolution:");
        for s in self.stats() {
            if s.attempts > 0 {
                let rate = (s.successes as f64 / s.attempts as f64) * 100.0;
                println!("  {:18} {:3}/{:3}  ({:.0}%)", format!("{}:", s.name), s.successes, s.attempts, rate);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
