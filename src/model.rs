//! Shared data model for mined evidence
//!
//! Tokens, fragments and pages come from the external page parser and are
//! never modified. Captions, logical tables and citations are derived by the
//! mining core; resolved sources come from the source locator.

use serde::{Deserialize, Serialize};

/// One positioned piece of text on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    /// Distance from the top of the page, as reported by the parser
    #[serde(alias = "top")]
    pub vertical_position: f64,
    #[serde(default)]
    pub page_index: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, vertical_position: f64, page_index: usize) -> Self {
        Self {
            text: text.into(),
            vertical_position,
            page_index,
        }
    }
}

/// A single cell of a raw table grid; `None` for cells the parser left empty
pub type Cell = Option<String>;

/// One raw table grid as found on one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFragment {
    pub rows: Vec<Vec<Cell>>,
    pub page_index: usize,
    #[serde(default)]
    pub origin_position: f64,
}

impl TableFragment {
    /// Widest row of the grid (zero for an empty or degenerate grid)
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// A parsed page: its tokens and the table grids found on it, in parser order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub index: usize,
    pub tokens: Vec<Token>,
    pub table_fragments: Vec<TableFragment>,
}

impl Page {
    /// All token texts of the page, space-joined
    pub fn text(&self) -> String {
        self.tokens
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Detected one-line table title and where it sits on its page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub text: String,
    pub vertical_position: f64,
    pub page_index: usize,
}

/// Kind of table a mining pass is looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableCategory {
    QualityAssessment,
    SearchStrategy,
    Other,
}

impl TableCategory {
    /// Human-readable label handed to the classification oracle
    pub fn label(&self) -> &'static str {
        match self {
            TableCategory::QualityAssessment => "Quality Assessment",
            TableCategory::SearchStrategy => "Search Strategy",
            TableCategory::Other => "Other",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TableCategory::QualityAssessment => "QualityAssessment",
            TableCategory::SearchStrategy => "SearchStrategy",
            TableCategory::Other => "Other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "QualityAssessment" | "Quality Assessment" => Some(TableCategory::QualityAssessment),
            "SearchStrategy" | "Search Strategy" => Some(TableCategory::SearchStrategy),
            "Other" => Some(TableCategory::Other),
            _ => None,
        }
    }
}

/// A fully merged table, possibly stitched from several pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalTable {
    pub title: Option<String>,
    pub rows: Vec<Vec<Cell>>,
    pub category: TableCategory,
    pub source_document_id: String,
    pub explanation_text: Option<String>,
}

impl LogicalTable {
    pub fn header(&self) -> Option<&[Cell]> {
        self.rows.first().map(Vec::as_slice)
    }
}

/// A reference-list entry identified as an included study
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based position in the source article's reference list
    pub index: usize,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    pub citation_text: String,
}

/// How a full-text source was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceMethod {
    DirectRepository,
    Mirror,
    PublisherPage,
    ScholarSearch,
}

impl SourceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMethod::DirectRepository => "direct_repository",
            SourceMethod::Mirror => "mirror",
            SourceMethod::PublisherPage => "publisher_page",
            SourceMethod::ScholarSearch => "scholar_search",
        }
    }
}

/// A retrievable location for a study's full text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSource {
    pub url: String,
    pub method: SourceMethod,
}

impl ResolvedSource {
    pub fn new(url: impl Into<String>, method: SourceMethod) -> Self {
        Self {
            url: url.into(),
            method,
        }
    }
}
