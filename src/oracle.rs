//! Collaborator contracts for classification and text extraction
//!
//! The mining core only sees these traits. Production runs back them with the
//! chat-completions client in [`crate::ai_client`]; tests and offline runs use
//! the deterministic implementations below.

use crate::error::Result;
use crate::model::TableCategory;

/// Value an explanation extractor returns when the text holds no explanation
pub const NO_EXPLANATION: &str = "0";

/// Judges whether a caption belongs to a requested category.
///
/// Must behave as a pure function of its two inputs.
pub trait ClassificationOracle: Send + Sync {
    fn classify(&self, category_label: &str, candidate_caption: &str) -> Result<bool>;

    /// Judges whether a document's first page announces a table of the
    /// category. Defaults to classifying the page text as one caption.
    fn screen_document(&self, category_label: &str, first_page_text: &str) -> Result<bool> {
        self.classify(category_label, first_page_text)
    }
}

/// Pulls the scoring-criteria explanation out of a table's raw page text
pub trait ExplanationExtractor: Send + Sync {
    /// Returns the explanation, or [`NO_EXPLANATION`]
    fn extract_explanation(&self, page_text: &str) -> Result<String>;
}

/// Reads included-study reference numbers out of a prose paragraph
pub trait IndexExtractor: Send + Sync {
    fn extract_indices(&self, paragraph_text: &str) -> Result<Vec<usize>>;
}

/// True when an extractor answer carries a usable explanation
pub fn is_explanation(answer: &str) -> bool {
    let trimmed = answer.trim();
    !trimmed.is_empty() && trimmed != NO_EXPLANATION
}

// =============================================================================
// Keyword oracle
// =============================================================================

/// Caption classifier driven by fixed keyword lists.
///
/// Used when no language model is configured. Rejections win over matches,
/// so "risk of bias" tables never count as quality assessment.
#[derive(Debug, Clone, Default)]
pub struct KeywordOracle;

const QUALITY_KEYWORDS: &[&str] = &[
    "quality",
    "newcastle",
    "ottawa",
    "nos ",
    "strobe",
    "grade",
];
const QUALITY_REJECTIONS: &[&str] = &["risk of bias"];

const SEARCH_KEYWORDS: &[&str] = &[
    "search strateg",
    "search terms",
    "medline",
    "embase",
    "database search",
    "literature search",
];

impl KeywordOracle {
    fn keywords_for(category: TableCategory) -> (&'static [&'static str], &'static [&'static str]) {
        match category {
            TableCategory::QualityAssessment => (QUALITY_KEYWORDS, QUALITY_REJECTIONS),
            TableCategory::SearchStrategy => (SEARCH_KEYWORDS, &[]),
            TableCategory::Other => (&[], &[]),
        }
    }
}

impl ClassificationOracle for KeywordOracle {
    fn classify(&self, category_label: &str, candidate_caption: &str) -> Result<bool> {
        let Some(category) = TableCategory::from_str(category_label) else {
            return Ok(false);
        };
        let (accept, reject) = Self::keywords_for(category);
        // Trailing space lets short tokens like "nos" match at the end of a caption
        let caption = format!("{} ", candidate_caption.to_lowercase());

        if reject.iter().any(|k| caption.contains(k)) {
            return Ok(false);
        }
        Ok(accept.iter().any(|k| caption.contains(k)))
    }

    /// A first page lists many captions, so rejections do not apply here
    fn screen_document(&self, category_label: &str, first_page_text: &str) -> Result<bool> {
        let Some(category) = TableCategory::from_str(category_label) else {
            return Ok(false);
        };
        let (accept, _) = Self::keywords_for(category);
        let text = format!("{} ", first_page_text.to_lowercase());
        Ok(accept.iter().any(|k| text.contains(k)))
    }
}

/// Explanation extractor that never finds anything
#[derive(Debug, Clone, Default)]
pub struct NoExplanation;

impl ExplanationExtractor for NoExplanation {
    fn extract_explanation(&self, _page_text: &str) -> Result<String> {
        Ok(NO_EXPLANATION.to_string())
    }
}

/// Index extractor that never finds anything
#[derive(Debug, Clone, Default)]
pub struct NoIndices;

impl IndexExtractor for NoIndices {
    fn extract_indices(&self, _paragraph_text: &str) -> Result<Vec<usize>> {
        Ok(Vec::new())
    }
}
