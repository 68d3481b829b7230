//! Study-index resolution
//!
//! Decides which reference-list positions are the studies a meta-analysis
//! actually synthesized. Tiers run in order and the first non-empty answer wins:
//! 1. structural: citation anchors in the body rows of an included-studies table
//! 2. semantic: the first matching Results paragraph, read by an index extractor
//!
//! An empty answer means "unknown", not an error.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::article::ParsedArticle;
use crate::model::Citation;
use crate::oracle::IndexExtractor;

/// Heading and caption words that mark included studies
pub const DEFAULT_STUDY_KEYWORDS: &[&str] = &["characteristics", "included", "selected", "studies"];

/// Inputs shared by all tiers
pub struct TierContext<'a> {
    pub article: &'a ParsedArticle,
    pub keywords: &'a [String],
    pub extractor: &'a dyn IndexExtractor,
}

impl TierContext<'_> {
    fn matches_keyword(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .any(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
    }
}

pub type TierFn = fn(&TierContext<'_>) -> Vec<usize>;

/// Resolution tiers in precedence order
pub const TIERS: &[(&str, TierFn)] = &[("structural", structural_tier), ("semantic", semantic_tier)];

pub fn default_keywords() -> Vec<String> {
    DEFAULT_STUDY_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

/// Anchors in included-studies tables, resolved to reference positions
pub fn structural_tier(ctx: &TierContext<'_>) -> Vec<usize> {
    let positions = ctx.article.reference_positions();
    let mut seen = HashSet::new();
    let mut indices = Vec::new();

    for table in ctx.article.tables.iter().filter(|t| ctx.matches_keyword(&t.caption)) {
        for anchor in table.rows.iter().flatten().flatten() {
            if let Some(&position) = positions.get(anchor.as_str()) {
                if seen.insert(position) {
                    indices.push(position);
                }
            }
        }
    }

    indices
}

/// Indices read from the first keyword-headed Results block that cites a reference
pub fn semantic_tier(ctx: &TierContext<'_>) -> Vec<usize> {
    let positions = ctx.article.reference_positions();
    let Some(block) = ctx.article.results_blocks.iter().find(|b| {
        ctx.matches_keyword(&b.heading) && b.anchors.iter().any(|a| positions.contains_key(a.as_str()))
    }) else {
        return Vec::new();
    };

    debug!(heading = %block.heading, "extracting study indices from results paragraph");
    match ctx.extractor.extract_indices(&block.text) {
        Ok(indices) => indices,
        Err(e) => {
            warn!(error = %e, "index extraction failed");
            Vec::new()
        }
    }
}

/// Ordered included-study indices; empty when no tier finds any
pub fn resolve_study_indices(
    article: &ParsedArticle,
    keywords: &[String],
    extractor: &dyn IndexExtractor,
) -> Vec<usize> {
    let ctx = TierContext {
        article,
        keywords,
        extractor,
    };
    for (name, tier) in TIERS {
        let indices = tier(&ctx);
        if !indices.is_empty() {
            debug!(tier = name, count = indices.len(), "study indices resolved");
            return indices;
        }
    }
    debug!("no tier found included studies");
    Vec::new()
}

/// Build Citations for reference positions.
///
/// Duplicates are dropped in first-seen order. Positions outside the
/// reference list are skipped.
pub fn citations_for(indices: &[usize], article: &ParsedArticle) -> Vec<Citation> {
    let mut seen = HashSet::new();
    let mut citations = Vec::new();

    for &index in indices {
        if !seen.insert(index) {
            continue;
        }
        let Some(reference) = article.reference(index) else {
            warn!(index, references = article.references.len(), "study index outside reference list");
            continue;
        };
        citations.push(Citation {
            index,
            doi: reference.doi.clone(),
            pmid: reference.pmid.clone(),
            pmcid: reference.pmcid.clone(),
            citation_text: reference.text.clone(),
        });
    }

    citations
}

/// Included-study Citations of an article
pub fn resolve_citations(
    article: &ParsedArticle,
    keywords: &[String],
    extractor: &dyn IndexExtractor,
) -> Vec<Citation> {
    citations_for(&resolve_study_indices(article, keywords, extractor), article)
}
