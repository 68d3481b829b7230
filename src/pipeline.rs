//! Mining pipeline
//!
//! Per document:
//! 1. tables: a first-page screen, then caption detection and the continuation
//!    machine, once per category that passes
//! 2. citations: study-index resolution over the article
//! 3. sources: the locator chain, once per citation
//! 4. one `DocumentRecord` with everything found
//!
//! Steps 1 and 2 are synchronous and run on a blocking thread. Documents run
//! concurrently; records are written by the batch loop only.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai_client::ChatClient;
use crate::error::Result;
use crate::model::{Citation, LogicalTable, Page, ResolvedSource, TableCategory};
use crate::oracle::{
    ClassificationOracle, ExplanationExtractor, IndexExtractor, KeywordOracle, NoExplanation, NoIndices,
};
use crate::pages::PageParser;
use crate::papers::article::ParsedArticle;
use crate::papers::locator::{MirrorLookup, ScholarSearch, SourceLocator, SourceQuery};
use crate::papers::mirror::MirrorClient;
use crate::papers::pmc::PmcClient;
use crate::papers::publisher::DoiResolverClient;
use crate::papers::pubmed::PubmedClient;
use crate::papers::scholar::ScholarClient;
use crate::papers::{http_client, study_index};
use crate::settings::Settings;
use crate::tables::{mine_category, screen_document};

/// Mining knobs taken from settings
#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub caption_marker: String,
    pub categories: Vec<TableCategory>,
    pub study_keywords: Vec<String>,
    pub document_concurrency: usize,
    pub citation_concurrency: usize,
}

impl From<&Settings> for MinerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            caption_marker: settings.caption_marker.clone(),
            categories: settings.categories.clone(),
            study_keywords: settings.study_keywords.clone(),
            document_concurrency: settings.document_concurrency.max(1),
            citation_concurrency: settings.citation_concurrency.max(1),
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// Classification and extraction backends
#[derive(Clone)]
pub struct Collaborators {
    pub oracle: Arc<dyn ClassificationOracle>,
    pub explainer: Arc<dyn ExplanationExtractor>,
    pub indexer: Arc<dyn IndexExtractor>,
}

impl Collaborators {
    /// Keyword classification with no extraction
    pub fn offline() -> Self {
        Self {
            oracle: Arc::new(KeywordOracle),
            explainer: Arc::new(NoExplanation),
            indexer: Arc::new(NoIndices),
        }
    }

    /// Chat-backed collaborators when an LLM key is configured, else offline ones
    pub fn from_settings(settings: &Settings) -> Self {
        match ChatClient::from_settings(&settings.llm, settings.http_timeout_secs) {
            Some(chat) => {
                let chat = Arc::new(chat);
                Self {
                    oracle: chat.clone(),
                    explainer: chat.clone(),
                    indexer: chat,
                }
            }
            None => {
                info!("no LLM key configured, using keyword classification");
                Self::offline()
            }
        }
    }
}

/// One document to mine
#[derive(Debug, Clone, Default)]
pub struct DocumentInput {
    pub id: String,
    pub pmid: Option<String>,
    /// Supplement pages for the table miner
    pub pages: Vec<Page>,
    /// Parsed article body for study-index resolution
    pub article: Option<ParsedArticle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCitation {
    #[serde(flatten)]
    pub citation: Citation,
    pub source: Option<ResolvedSource>,
}

/// Everything mined from one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub pmid: Option<String>,
    pub tables: Vec<LogicalTable>,
    pub citations: Vec<ResolvedCitation>,
}

/// Totals over a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub documents: usize,
    pub tables: usize,
    pub citations: usize,
    pub resolved_sources: usize,
}

impl BatchSummary {
    fn add(&mut self, record: &DocumentRecord) {
        self.documents += 1;
        self.tables += record.tables.len();
        self.citations += record.citations.len();
        self.resolved_sources += record.citations.iter().filter(|c| c.source.is_some()).count();
    }
}

/// Writes one JSON record per line
pub struct RecordWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn write(&mut self, record: &DocumentRecord) -> Result<()> {
        serde_json::to_writer(&mut self.inner, record)?;
        self.inner.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// One line of a batch manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    #[serde(default)]
    pub pmid: Option<String>,
    #[serde(default)]
    pub pmcid: Option<String>,
    /// Page JSON of the document's supplement
    #[serde(default)]
    pub pages: Option<PathBuf>,
    /// Saved article HTML; fetched by PMCID when absent
    #[serde(default)]
    pub article_html: Option<PathBuf>,
}

/// Read a manifest; relative paths are taken relative to the manifest file
pub fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let mut entries: Vec<ManifestEntry> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let base = path.parent().unwrap_or(Path::new(""));
    for entry in &mut entries {
        for file in [&mut entry.pages, &mut entry.article_html].into_iter().flatten() {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
    }
    Ok(entries)
}

pub struct Miner {
    config: Arc<MinerConfig>,
    collaborators: Collaborators,
    locator: Arc<SourceLocator>,
    repository: Option<Arc<PmcClient>>,
}

impl Miner {
    pub fn new(config: MinerConfig, collaborators: Collaborators, locator: SourceLocator) -> Self {
        Self {
            config: Arc::new(config),
            collaborators,
            locator: Arc::new(locator),
            repository: None,
        }
    }

    /// Repository used to fetch article pages for manifest entries
    pub fn with_repository(mut self, repository: Arc<PmcClient>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Production wiring: HTTP collaborators and chat or keyword backends
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let client = http_client(settings.http_timeout_secs, &settings.user_agent)?;

        let repository = Arc::new(PmcClient::new(client.clone(), &settings.repository_base_url));
        let pubmed = Arc::new(PubmedClient::new(
            client.clone(),
            &settings.eutils_base_url,
            settings.ncbi_api_key.clone(),
        ));
        let mirror = settings
            .mirror_base_url
            .as_ref()
            .map(|url| Arc::new(MirrorClient::new(client.clone(), url)) as Arc<dyn MirrorLookup>);
        let landing = Arc::new(DoiResolverClient::new(client.clone(), &settings.doi_resolver_base_url));
        let scholar = settings
            .scholar_base_url
            .as_ref()
            .map(|url| Arc::new(ScholarClient::new(client.clone(), url)) as Arc<dyn ScholarSearch>);

        let locator = SourceLocator::standard(repository.clone(), pubmed, mirror, landing, scholar);
        debug!(order = ?locator.method_order(), "source locator ready");

        Ok(Self::new(MinerConfig::from(settings), Collaborators::from_settings(settings), locator)
            .with_repository(repository))
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    pub fn locator(&self) -> &SourceLocator {
        &self.locator
    }

    pub fn repository(&self) -> Option<&PmcClient> {
        self.repository.as_deref()
    }

    /// Logical tables of every configured category, in category order
    pub fn mine_tables(&self, document_id: &str, pages: &[Page]) -> Vec<LogicalTable> {
        mine_tables_with(&self.config, &self.collaborators, document_id, pages)
    }

    /// Included-study citations of an article, without sources
    pub fn resolve_citations(&self, article: &ParsedArticle) -> Vec<Citation> {
        study_index::resolve_citations(article, &self.config.study_keywords, self.collaborators.indexer.as_ref())
    }

    /// Run a synchronous mining step on a blocking thread
    async fn run_blocking<T, F>(&self, document_id: &str, step: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&MinerConfig, &Collaborators) -> T + Send + 'static,
    {
        let config = self.config.clone();
        let collaborators = self.collaborators.clone();
        match tokio::task::spawn_blocking(move || step(config.as_ref(), &collaborators)).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(document = %document_id, error = %e, "mining task failed");
                None
            }
        }
    }

    /// [`Miner::mine_tables`] on a blocking thread
    pub async fn extract_tables(&self, document_id: &str, pages: Vec<Page>) -> Vec<LogicalTable> {
        let id = document_id.to_string();
        self.run_blocking(document_id, move |config, collaborators| {
            mine_tables_with(config, collaborators, &id, &pages)
        })
        .await
        .unwrap_or_default()
    }

    /// [`Miner::resolve_citations`] on a blocking thread
    pub async fn extract_citations(&self, document_id: &str, article: ParsedArticle) -> Vec<Citation> {
        self.run_blocking(document_id, move |config, collaborators| {
            study_index::resolve_citations(&article, &config.study_keywords, collaborators.indexer.as_ref())
        })
        .await
        .unwrap_or_default()
    }

    /// Run the full pipeline on one document. Never fails; a broken stage
    /// leaves its part of the record empty.
    pub async fn mine_document(&self, input: DocumentInput) -> DocumentRecord {
        let DocumentInput { id, pmid, pages, article } = input;

        let tables = self.extract_tables(&id, pages).await;
        let citations = match article {
            Some(article) => self.extract_citations(&id, article).await,
            None => Vec::new(),
        };

        let citations: Vec<ResolvedCitation> = stream::iter(citations)
            .map(|citation| self.locate_citation(citation))
            .buffered(self.config.citation_concurrency)
            .collect()
            .await;

        info!(
            document = %id,
            tables = tables.len(),
            citations = citations.len(),
            resolved = citations.iter().filter(|c| c.source.is_some()).count(),
            "document mined"
        );

        DocumentRecord {
            document_id: id,
            pmid,
            tables,
            citations,
        }
    }

    async fn locate_citation(&self, citation: Citation) -> ResolvedCitation {
        let query = SourceQuery::from_citation(&citation);
        let source = if query.is_empty() {
            debug!(index = citation.index, "citation has no identifiers");
            None
        } else {
            self.locator.locate(query).await
        };
        ResolvedCitation { citation, source }
    }

    /// Mine documents concurrently and write each record as it completes.
    ///
    /// Only output failures abort the batch.
    pub async fn mine_batch<W: Write>(
        &self,
        inputs: Vec<DocumentInput>,
        writer: &mut RecordWriter<W>,
    ) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        let mut records = stream::iter(inputs)
            .map(|input| self.mine_document(input))
            .buffer_unordered(self.config.document_concurrency);

        while let Some(record) = records.next().await {
            writer.write(&record)?;
            summary.add(&record);
        }
        writer.flush()?;

        info!(
            documents = summary.documents,
            tables = summary.tables,
            citations = summary.citations,
            resolved = summary.resolved_sources,
            "batch complete"
        );
        Ok(summary)
    }

    /// Load one manifest entry. Missing or unreadable parts are logged and
    /// left empty.
    pub async fn prepare(&self, entry: &ManifestEntry, parser: &dyn PageParser) -> DocumentInput {
        let pages = match &entry.pages {
            Some(path) => parser.parse(path).unwrap_or_else(|e| {
                warn!(document = %entry.id, path = %path.display(), error = %e, "could not read pages");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let html = match (&entry.article_html, &entry.pmcid, &self.repository) {
            (Some(path), _, _) => std::fs::read_to_string(path)
                .map_err(|e| warn!(document = %entry.id, path = %path.display(), error = %e, "could not read article"))
                .ok(),
            (None, Some(pmcid), Some(repository)) => repository
                .fetch_article_html(pmcid)
                .await
                .map_err(|e| warn!(document = %entry.id, pmcid = %pmcid, error = %e, "could not fetch article"))
                .ok(),
            _ => None,
        };

        DocumentInput {
            id: entry.id.clone(),
            pmid: entry.pmid.clone(),
            pages,
            article: html.map(|h| ParsedArticle::parse(&h)),
        }
    }
}

fn mine_tables_with(
    config: &MinerConfig,
    collaborators: &Collaborators,
    document_id: &str,
    pages: &[Page],
) -> Vec<LogicalTable> {
    config
        .categories
        .iter()
        .filter(|&&category| {
            let passed = screen_document(pages, category, collaborators.oracle.as_ref());
            if !passed {
                debug!(document = %document_id, category = category.as_str(), "first page screen rejected");
            }
            passed
        })
        .flat_map(|&category| {
            mine_category(
                pages,
                category,
                document_id,
                &config.caption_marker,
                collaborators.oracle.as_ref(),
                collaborators.explainer.as_ref(),
            )
        })
        .collect()
}
