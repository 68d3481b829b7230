//! Table continuation state machine
//!
//! PDF table extraction yields one grid per page and no table identity, so a
//! table spanning several pages has to be stitched back together from caption
//! presence alone:
//! - a captioned grid the oracle accepts opens a new table
//! - an uncaptioned grid continues whatever table is open
//! - any other captioned grid closes the open table
//!
//! An uncaptioned grid right after an open table is always treated as its
//! continuation, even when it is an unrelated untitled table.

use tracing::{debug, info, warn};

use super::caption::{take_caption, SeenPositions};
use super::merge::{explanation_row, merge_fragments};
use crate::model::{Caption, LogicalTable, Page, TableCategory, TableFragment};
use crate::oracle::{is_explanation, ClassificationOracle, ExplanationExtractor};

/// Observable state of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Searching,
    Accumulating { buffered: usize },
}

/// A table being collected across pages
#[derive(Debug)]
struct Accumulation {
    caption: Caption,
    fragments: Vec<TableFragment>,
    page_texts: Vec<String>,
    last_text_page: Option<usize>,
}

impl Accumulation {
    fn open(caption: Caption, fragment: TableFragment, page_text: &str) -> Self {
        let mut acc = Self {
            caption,
            fragments: Vec::new(),
            page_texts: Vec::new(),
            last_text_page: None,
        };
        acc.push(fragment, page_text);
        acc
    }

    fn push(&mut self, fragment: TableFragment, page_text: &str) {
        // Page text is buffered once per page, however many grids it holds
        if self.last_text_page != Some(fragment.page_index) {
            self.page_texts.push(page_text.to_string());
            self.last_text_page = Some(fragment.page_index);
        }
        self.fragments.push(fragment);
    }
}

/// Stitches per-page table grids of one category into logical tables
pub struct ContinuationMachine<'a> {
    category: TableCategory,
    document_id: String,
    oracle: &'a dyn ClassificationOracle,
    explainer: &'a dyn ExplanationExtractor,
    open: Option<Accumulation>,
    emitted: Vec<LogicalTable>,
    finalizations: usize,
}

impl<'a> ContinuationMachine<'a> {
    pub fn new(
        category: TableCategory,
        document_id: impl Into<String>,
        oracle: &'a dyn ClassificationOracle,
        explainer: &'a dyn ExplanationExtractor,
    ) -> Self {
        Self {
            category,
            document_id: document_id.into(),
            oracle,
            explainer,
            open: None,
            emitted: Vec::new(),
            finalizations: 0,
        }
    }

    pub fn state(&self) -> MachineState {
        match &self.open {
            None => MachineState::Searching,
            Some(acc) => MachineState::Accumulating {
                buffered: acc.fragments.len(),
            },
        }
    }

    /// Number of accumulations finalized so far
    pub fn finalizations(&self) -> usize {
        self.finalizations
    }

    /// Tables emitted so far, in finalization order
    pub fn emitted(&self) -> &[LogicalTable] {
        &self.emitted
    }

    /// Feed the next grid in document order, with the caption detected for it
    pub fn feed(&mut self, caption: Option<&Caption>, fragment: TableFragment, page_text: &str) {
        match caption {
            None => match self.open.as_mut() {
                Some(acc) => {
                    debug!(page = fragment.page_index, "continuing open table");
                    acc.push(fragment, page_text);
                }
                None => {
                    debug!(page = fragment.page_index, "uncaptioned grid ignored");
                }
            },
            Some(caption) => {
                let accepted = self.matches(caption);
                if self.open.is_some() {
                    self.finalize();
                }
                if accepted {
                    debug!(page = fragment.page_index, caption = %caption.text, "opening table");
                    self.open = Some(Accumulation::open(caption.clone(), fragment, page_text));
                } else {
                    debug!(page = fragment.page_index, caption = %caption.text, "caption rejected");
                }
            }
        }
    }

    /// Flush any open table and return everything emitted
    pub fn finish(mut self) -> Vec<LogicalTable> {
        if self.open.is_some() {
            self.finalize();
        }
        self.emitted
    }

    fn matches(&self, caption: &Caption) -> bool {
        match self.oracle.classify(self.category.label(), &caption.text) {
            Ok(answer) => answer,
            Err(e) => {
                warn!(document = %self.document_id, caption = %caption.text, "classification failed: {}", e);
                false
            }
        }
    }

    fn explanation_for(&self, acc: &Accumulation) -> Option<String> {
        match self.explainer.extract_explanation(&acc.page_texts.join("\n")) {
            Ok(answer) if is_explanation(&answer) => Some(answer.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(document = %self.document_id, "explanation extraction failed: {}", e);
                None
            }
        }
    }

    fn finalize(&mut self) {
        let Some(acc) = self.open.take() else { return };
        self.finalizations += 1;

        let mut rows = merge_fragments(&acc.fragments);
        let width = rows.first().map(Vec::len).unwrap_or(0);

        // Only quality tables carry scoring criteria
        let explanation = if self.category == TableCategory::QualityAssessment {
            self.explanation_for(&acc)
        } else {
            None
        };
        if let Some(text) = &explanation {
            rows.push(explanation_row(text, width));
        }

        info!(
            document = %self.document_id,
            category = self.category.as_str(),
            title = %acc.caption.text,
            fragments = acc.fragments.len(),
            rows = rows.len(),
            "table finalized"
        );

        self.emitted.push(LogicalTable {
            title: Some(acc.caption.text),
            rows,
            category: self.category,
            source_document_id: self.document_id.clone(),
            explanation_text: explanation,
        });
    }
}

/// Ask the oracle whether a document's first page announces a table of
/// `category`. Documents without pages, or whose first page has no text,
/// fail the screen; oracle errors count as rejection.
pub fn screen_document(pages: &[Page], category: TableCategory, oracle: &dyn ClassificationOracle) -> bool {
    let Some(first) = pages.first() else {
        return false;
    };
    let text = first.text();
    if text.trim().is_empty() {
        return false;
    }
    match oracle.screen_document(category.label(), &text) {
        Ok(answer) => answer,
        Err(e) => {
            warn!(category = category.as_str(), "document screening failed: {}", e);
            false
        }
    }
}

/// Run one category pass over a document's pages, in order.
///
/// Captions are detected per grid, with seen positions reset at each page so
/// two captioned grids on one page get their own captions. Grids with no
/// columns are skipped.
pub fn mine_category(
    pages: &[Page],
    category: TableCategory,
    document_id: &str,
    marker: &str,
    oracle: &dyn ClassificationOracle,
    explainer: &dyn ExplanationExtractor,
) -> Vec<LogicalTable> {
    let mut machine = ContinuationMachine::new(category, document_id, oracle, explainer);
    let mut seen = SeenPositions::new();

    for page in pages {
        seen.clear();
        let page_text = page.text();

        for fragment in &page.table_fragments {
            if fragment.column_count() == 0 {
                debug!(document = %document_id, page = page.index, "skipping grid without columns");
                continue;
            }
            let caption = take_caption(&page.tokens, marker, &mut seen);
            machine.feed(caption.as_ref(), fragment.clone(), &page_text);
        }
    }

    machine.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MinerError, Result};
    use crate::model::{Cell, Token};
    use crate::oracle::{NoExplanation, NO_EXPLANATION};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Accepts captions containing a fixed needle and counts its calls
    struct NeedleOracle {
        needle: &'static str,
        calls: AtomicUsize,
    }

    impl NeedleOracle {
        fn new(needle: &'static str) -> Self {
            Self { needle, calls: AtomicUsize::new(0) }
        }
    }

    impl ClassificationOracle for NeedleOracle {
        fn classify(&self, category_label: &str, candidate_caption: &str) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(TableCategory::from_str(category_label).is_some());
            Ok(candidate_caption.contains(self.needle))
        }
    }

    struct FailingOracle;

    impl ClassificationOracle for FailingOracle {
        fn classify(&self, _: &str, _: &str) -> Result<bool> {
            Err(MinerError::Oracle("model unavailable".to_string()))
        }
    }

    /// Records the text it was given and answers with a fixed string
    struct RecordingExplainer {
        answer: &'static str,
        seen: Mutex<Vec<String>>,
    }

    impl ExplanationExtractor for RecordingExplainer {
        fn extract_explanation(&self, page_text: &str) -> Result<String> {
            self.seen.lock().unwrap().push(page_text.to_string());
            Ok(self.answer.to_string())
        }
    }

    fn row(cells: &[&str]) -> Vec<Cell> {
        cells.iter().map(|c| Some(c.to_string())).collect()
    }

    fn caption(text: &str, page_index: usize) -> Caption {
        Caption { text: text.to_string(), vertical_position: 10.0, page_index }
    }

    fn fragment(page_index: usize, rows: Vec<Vec<Cell>>) -> TableFragment {
        TableFragment { rows, page_index, origin_position: 50.0 }
    }

    fn quality_page(index: usize, title: Option<&str>, rows: Vec<Vec<Cell>>) -> Page {
        let mut tokens = Vec::new();
        if let Some(title) = title {
            for word in title.split(' ') {
                tokens.push(Token::new(word, 10.0, index));
            }
        }
        tokens.push(Token::new("body", 80.0, index));
        Page {
            index,
            tokens,
            table_fragments: vec![fragment(index, rows)],
        }
    }

    #[test]
    fn test_quality_table_across_pages_scenario() {
        let oracle = NeedleOracle::new("Quality");
        let explainer = NoExplanation;
        let mut machine =
            ContinuationMachine::new(TableCategory::QualityAssessment, "doc-1", &oracle, &explainer);
        let header = row(&["Author", "Score"]);

        machine.feed(
            Some(&caption("eTable 4. Quality Score", 0)),
            fragment(0, vec![header.clone(), row(&["Wong", "5"])]),
            "page one",
        );
        assert_eq!(machine.state(), MachineState::Accumulating { buffered: 1 });

        machine.feed(None, fragment(1, vec![header.clone(), row(&["Brady", "5"])]), "page two");
        assert_eq!(machine.state(), MachineState::Accumulating { buffered: 2 });

        machine.feed(
            Some(&caption("eTable 5. Search Strategy", 2)),
            fragment(2, vec![row(&["Database", "Query"])]),
            "page three",
        );
        assert_eq!(machine.state(), MachineState::Searching);
        assert_eq!(machine.finalizations(), 1);

        let tables = machine.finish();
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.title.as_deref(), Some("eTable 4. Quality Score"));
        assert_eq!(table.rows, vec![header, row(&["Wong", "5"]), row(&["Brady", "5"])]);
        assert_eq!(table.category, TableCategory::QualityAssessment);
        assert_eq!(table.source_document_id, "doc-1");
        assert_eq!(table.explanation_text, None);
    }

    #[test]
    fn test_uncaptioned_grid_while_searching_is_ignored() {
        let oracle = NeedleOracle::new("Quality");
        let explainer = NoExplanation;
        let mut machine =
            ContinuationMachine::new(TableCategory::QualityAssessment, "doc", &oracle, &explainer);

        machine.feed(None, fragment(0, vec![row(&["a"])]), "");
        assert_eq!(machine.state(), MachineState::Searching);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
        assert!(machine.finish().is_empty());
    }

    #[test]
    fn test_rejected_caption_while_searching_is_ignored() {
        let oracle = NeedleOracle::new("Quality");
        let explainer = NoExplanation;
        let mut machine =
            ContinuationMachine::new(TableCategory::QualityAssessment, "doc", &oracle, &explainer);

        machine.feed(Some(&caption("eTable 1. Search Strategy", 0)), fragment(0, vec![row(&["a"])]), "");
        assert_eq!(machine.state(), MachineState::Searching);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert!(machine.finish().is_empty());
    }

    #[test]
    fn test_accepted_caption_while_accumulating_starts_new_table() {
        let oracle = NeedleOracle::new("Quality");
        let explainer = NoExplanation;
        let mut machine =
            ContinuationMachine::new(TableCategory::QualityAssessment, "doc", &oracle, &explainer);

        machine.feed(Some(&caption("eTable 2. Quality Scoring", 0)), fragment(0, vec![row(&["a"])]), "");
        machine.feed(Some(&caption("eTable 3. Quality Thresholds", 1)), fragment(1, vec![row(&["b"])]), "");
        assert_eq!(machine.state(), MachineState::Accumulating { buffered: 1 });
        assert_eq!(machine.finalizations(), 1);

        let tables = machine.finish();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].title.as_deref(), Some("eTable 2. Quality Scoring"));
        assert_eq!(tables[1].title.as_deref(), Some("eTable 3. Quality Thresholds"));
    }

    #[test]
    fn test_open_table_is_flushed_exactly_once() {
        let oracle = NeedleOracle::new("Quality");
        let explainer = RecordingExplainer { answer: NO_EXPLANATION, seen: Mutex::new(Vec::new()) };
        let mut machine =
            ContinuationMachine::new(TableCategory::QualityAssessment, "doc", &oracle, &explainer);

        machine.feed(Some(&caption("eTable 4. Quality", 0)), fragment(0, vec![row(&["a"])]), "p1");
        machine.feed(None, fragment(1, vec![row(&["b"])]), "p2");

        let tables = machine.finish();
        assert_eq!(tables.len(), 1);
        assert_eq!(explainer.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_table_count_matches_finalizations() {
        let oracle = NeedleOracle::new("Quality");
        let explainer = NoExplanation;
        let mut machine =
            ContinuationMachine::new(TableCategory::QualityAssessment, "doc", &oracle, &explainer);

        let script: Vec<Option<&str>> = vec![
            Some("eTable 1. Quality A"),
            None,
            Some("eTable 2. Forest data"),
            None,
            Some("eTable 3. Quality B"),
            Some("eTable 4. Quality C"),
            None,
        ];
        for (page, title) in script.into_iter().enumerate() {
            let cap = title.map(|t| caption(t, page));
            let cell = page.to_string();
            machine.feed(cap.as_ref(), fragment(page, vec![row(&[cell.as_str()])]), "");
        }

        let before_finish = machine.finalizations();
        let emitted_before = machine.emitted().len();
        assert_eq!(before_finish, emitted_before);

        let tables = machine.finish();
        assert_eq!(tables.len(), 3);
        assert_eq!(tables.len(), before_finish + 1);
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(tables[1].rows.len(), 1);
        assert_eq!(tables[2].rows.len(), 2);
    }

    #[test]
    fn test_explanation_is_appended_as_trailing_row() {
        let oracle = NeedleOracle::new("Quality");
        let explainer = RecordingExplainer {
            answer: "S1: representativeness of the exposed cohort",
            seen: Mutex::new(Vec::new()),
        };
        let mut machine =
            ContinuationMachine::new(TableCategory::QualityAssessment, "doc", &oracle, &explainer);

        machine.feed(
            Some(&caption("eTable 4. Quality", 0)),
            fragment(0, vec![row(&["Author", "S1", "Score"]), row(&["Wong", "*", "5"])]),
            "page one text",
        );
        machine.feed(None, fragment(1, vec![row(&["Brady", "*", "5"])]), "page two text");

        let tables = machine.finish();
        let table = &tables[0];
        assert_eq!(
            table.explanation_text.as_deref(),
            Some("S1: representativeness of the exposed cohort")
        );
        assert_eq!(
            table.rows.last().unwrap(),
            &vec![
                Some("S1: representativeness of the exposed cohort".to_string()),
                Some(String::new()),
                Some(String::new()),
            ]
        );
        assert_eq!(
            explainer.seen.lock().unwrap().as_slice(),
            &["page one text\npage two text".to_string()]
        );
    }

    #[test]
    fn test_search_strategy_tables_get_no_explanation() {
        let oracle = NeedleOracle::new("Search");
        let explainer = RecordingExplainer {
            answer: "S1: representativeness of the exposed cohort",
            seen: Mutex::new(Vec::new()),
        };
        let mut machine =
            ContinuationMachine::new(TableCategory::SearchStrategy, "doc", &oracle, &explainer);

        machine.feed(
            Some(&caption("eTable 1. Search Strategy", 0)),
            fragment(0, vec![row(&["Database", "Terms"]), row(&["MEDLINE", "retinopathy"])]),
            "page one text",
        );

        let tables = machine.finish();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].explanation_text, None);
        assert_eq!(tables[0].rows.len(), 2);
        assert!(explainer.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_screen_document_reads_first_page() {
        let oracle = NeedleOracle::new("Quality");
        let pages = vec![
            quality_page(0, Some("eTable 4. Quality Score"), vec![row(&["a"])]),
            quality_page(1, Some("eTable 5. Search Strategy"), vec![row(&["b"])]),
        ];
        assert!(screen_document(&pages, TableCategory::QualityAssessment, &oracle));

        let oracle = NeedleOracle::new("Search");
        assert!(!screen_document(&pages, TableCategory::SearchStrategy, &oracle));
        assert!(!screen_document(&[], TableCategory::SearchStrategy, &oracle));
        assert!(!screen_document(&pages, TableCategory::QualityAssessment, &FailingOracle));
    }

    #[test]
    fn test_oracle_failure_counts_as_rejection() {
        let explainer = NoExplanation;
        let mut machine =
            ContinuationMachine::new(TableCategory::QualityAssessment, "doc", &FailingOracle, &explainer);
        machine.feed(Some(&caption("eTable 4. Quality", 0)), fragment(0, vec![row(&["a"])]), "");
        assert_eq!(machine.state(), MachineState::Searching);
        assert!(machine.finish().is_empty());
    }

    #[test]
    fn test_mine_category_over_pages() {
        let oracle = NeedleOracle::new("Quality");
        let explainer = NoExplanation;
        let header = row(&["Author", "Score"]);
        let pages = vec![
            quality_page(0, Some("eTable 4. Quality Score"), vec![header.clone(), row(&["Wong", "5"])]),
            quality_page(1, None, vec![header.clone(), row(&["Brady", "5"])]),
            quality_page(2, Some("eTable 5. Search Strategy"), vec![row(&["Database", "Query"])]),
        ];

        let tables = mine_category(
            &pages,
            TableCategory::QualityAssessment,
            "doc-9",
            "eTable",
            &oracle,
            &explainer,
        );
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 3);
    }

    #[test]
    fn test_mine_category_two_captions_on_one_page() {
        let oracle = NeedleOracle::new("Quality");
        let explainer = NoExplanation;
        let page = Page {
            index: 0,
            tokens: vec![
                Token::new("eTable", 10.0, 0),
                Token::new("1.", 10.0, 0),
                Token::new("Quality", 10.0, 0),
                Token::new("eTable", 400.0, 0),
                Token::new("2.", 400.0, 0),
                Token::new("Quality", 400.0, 0),
                Token::new("thresholds", 400.0, 0),
            ],
            table_fragments: vec![
                fragment(0, vec![row(&["A", "B"]), row(&["1", "2"])]),
                fragment(0, vec![row(&["C", "D"]), row(&["3", "4"])]),
            ],
        };

        let tables = mine_category(
            &[page],
            TableCategory::QualityAssessment,
            "doc",
            "eTable",
            &oracle,
            &explainer,
        );
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].title.as_deref(), Some("eTable 1. Quality"));
        assert_eq!(tables[1].title.as_deref(), Some("eTable 2. Quality thresholds"));
    }

    #[test]
    fn test_mine_category_skips_grids_without_columns() {
        let oracle = NeedleOracle::new("Quality");
        let explainer = NoExplanation;
        let mut page = quality_page(0, Some("eTable 4. Quality"), vec![row(&["a", "b"])]);
        page.table_fragments.insert(0, fragment(0, vec![Vec::new()]));

        let tables = mine_category(
            &[page],
            TableCategory::QualityAssessment,
            "doc",
            "eTable",
            &oracle,
            &explainer,
        );
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows, vec![row(&["a", "b"])]);
    }
}
