//! Article HTML parsing
//!
//! Turns a repository article page into owned, thread-safe data:
//! - the reference list, in order, with identifiers pulled from each entry
//! - captioned tables, with the citation-anchor targets found in each body cell
//! - text blocks (subsections and paragraphs) of the Results section
//!
//! Handles both the current PMC markup (`section.ref-list`, `section.tw`) and
//! the older one (`div.ref-cit-blk`, `div.table-wrap`).

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::pmc::extract_pmcid;
use super::pubmed::{extract_doi, extract_pmid};

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static REFERENCE_ITEMS: LazyLock<Selector> = LazyLock::new(|| {
    selector("section.ref-list li[id], div.ref-list li[id], ol.references > li[id], div.ref-cit-blk[id]")
});
static TABLE_WRAPS: LazyLock<Selector> =
    LazyLock::new(|| selector("section.tw, div.table-wrap, figure.table"));
static BARE_TABLES: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static CAPTION_PARTS: LazyLock<Selector> =
    LazyLock::new(|| selector(".obj_head, .label, .caption, caption, figcaption"));
static TABLE_ROWS: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static TABLE_CELLS: LazyLock<Selector> = LazyLock::new(|| selector("td, th"));
static ANCHORS: LazyLock<Selector> = LazyLock::new(|| selector("a[href*='#'], a[rid]"));
static LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static SECTION_HEADINGS: LazyLock<Selector> = LazyLock::new(|| selector("h2"));
static RESULT_BLOCKS: LazyLock<Selector> = LazyLock::new(|| selector("section, div.sec, p"));
static BLOCK_HEADINGS: LazyLock<Selector> = LazyLock::new(|| selector("h3, h4, h5"));
/// "Results", optionally after a section number ("3.", "3.1", "III.")
static RESULTS_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:\d+(?:\.\d+)*|[ivxlc]+)\.?\s+)?results\b").expect("valid heading regex")
});
static RUN_IN_HEADINGS: LazyLock<Selector> = LazyLock::new(|| selector("strong, b"));

/// One entry of the article's reference list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// 1-based position in the list
    pub position: usize,
    /// Element id that in-text citation anchors point at
    pub anchor_id: String,
    pub text: String,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
}

/// A captioned table of the article body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleTable {
    pub caption: String,
    /// Body rows; each cell lists the anchor targets it links to
    pub rows: Vec<Vec<Vec<String>>>,
}

/// A heading-led block of prose
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    pub heading: String,
    pub text: String,
    pub anchors: Vec<String>,
}

/// Everything the study-index resolver needs from an article
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedArticle {
    pub references: Vec<Reference>,
    pub tables: Vec<ArticleTable>,
    pub results_blocks: Vec<TextBlock>,
}

impl ParsedArticle {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        Self {
            references: parse_references(&document),
            tables: parse_tables(&document),
            results_blocks: parse_results(&document),
        }
    }

    /// Map from anchor target id to 1-based reference position
    pub fn reference_positions(&self) -> HashMap<&str, usize> {
        self.references
            .iter()
            .map(|r| (r.anchor_id.as_str(), r.position))
            .collect()
    }

    /// Reference at a 1-based position
    pub fn reference(&self, position: usize) -> Option<&Reference> {
        position
            .checked_sub(1)
            .and_then(|i| self.references.get(i))
    }
}

/// Collapse all text under an element into single-spaced plain text
pub fn plain_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Target id of an in-page anchor (`rid` wins over the href fragment)
fn anchor_target(anchor: &ElementRef<'_>) -> Option<String> {
    let value = anchor.value();
    if let Some(rid) = value.attr("rid") {
        let rid = rid.trim();
        if !rid.is_empty() {
            return Some(rid.to_string());
        }
    }
    let href = value.attr("href")?;
    let (_, fragment) = href.split_once('#')?;
    let fragment = fragment.trim();
    (!fragment.is_empty()).then(|| fragment.to_string())
}

fn anchors_in(element: &ElementRef<'_>) -> Vec<String> {
    element.select(&ANCHORS).filter_map(|a| anchor_target(&a)).collect()
}

fn parse_references(document: &Html) -> Vec<Reference> {
    let mut references: Vec<Reference> = Vec::new();

    for item in document.select(&REFERENCE_ITEMS) {
        let Some(id) = item.value().attr("id") else { continue };
        if references.iter().any(|r| r.anchor_id == id) {
            continue;
        }

        let text = plain_text(&item);
        let hrefs: Vec<&str> = item
            .select(&LINKS)
            .filter_map(|a| a.value().attr("href"))
            .collect();

        let doi = hrefs
            .iter()
            .find_map(|h| extract_doi(&urlencoding::decode(h).map(|d| d.into_owned()).unwrap_or_else(|_| h.to_string())))
            .or_else(|| extract_doi(&text));
        let pmid = hrefs
            .iter()
            .find_map(|h| extract_pmid(h))
            .or_else(|| extract_pmid(&text));
        let pmcid = extract_pmcid(&hrefs.iter().map(|h| h.to_string()).collect::<Vec<_>>())
            .or_else(|| extract_pmcid(&[text.clone()]))
            .map(|digits| format!("PMC{}", digits));

        references.push(Reference {
            position: references.len() + 1,
            anchor_id: id.to_string(),
            text,
            doi,
            pmid,
            pmcid,
        });
    }

    references
}

fn in_thead(row: &ElementRef<'_>) -> bool {
    row.ancestors()
        .filter_map(|node| node.value().as_element())
        .any(|el| el.name() == "thead")
}

fn parse_table_rows(container: &ElementRef<'_>) -> Vec<Vec<Vec<String>>> {
    container
        .select(&TABLE_ROWS)
        .filter(|row| !in_thead(row))
        .filter(|row| row.select(&TABLE_CELLS).any(|c| c.value().name() == "td"))
        .map(|row| row.select(&TABLE_CELLS).map(|cell| anchors_in(&cell)).collect())
        .collect()
}

fn parse_tables(document: &Html) -> Vec<ArticleTable> {
    let wrapped: Vec<ArticleTable> = document
        .select(&TABLE_WRAPS)
        .map(|wrap| ArticleTable {
            caption: wrap
                .select(&CAPTION_PARTS)
                .map(|part| plain_text(&part))
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            rows: parse_table_rows(&wrap),
        })
        .collect();

    if !wrapped.is_empty() {
        return wrapped;
    }

    document
        .select(&BARE_TABLES)
        .map(|table| ArticleTable {
            caption: table
                .select(&CAPTION_PARTS)
                .next()
                .map(|c| plain_text(&c))
                .unwrap_or_default(),
            rows: parse_table_rows(&table),
        })
        .collect()
}

fn parse_results(document: &Html) -> Vec<TextBlock> {
    let Some(results) = document
        .select(&SECTION_HEADINGS)
        .find(|h| RESULTS_HEADING.is_match(&plain_text(h)))
        .and_then(|h| h.parent())
        .and_then(ElementRef::wrap)
    else {
        return Vec::new();
    };

    results
        .select(&RESULT_BLOCKS)
        .filter(|block| block.id() != results.id())
        .map(|block| {
            let heading_selector: &Selector = if block.value().name() == "p" {
                &*RUN_IN_HEADINGS
            } else {
                &*BLOCK_HEADINGS
            };
            TextBlock {
                heading: block
                    .select(heading_selector)
                    .next()
                    .map(|h| plain_text(&h))
                    .unwrap_or_default(),
                text: plain_text(&block),
                anchors: anchors_in(&block),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r##"
<html><body>
<section id="abstract"><h2>Abstract</h2><p>Pooled prevalence <a href="#r1">1</a>.</p></section>
<section id="sec2"><h2>Methods</h2><p>We searched MEDLINE.</p></section>
<section id="sec3"><h2>Results</h2>
  <section id="sec3-1"><h3>Study Selection</h3>
    <p>A total of 412 records were screened.</p>
  </section>
  <section id="sec3-2"><h3>Characteristics of Included Studies</h3>
    <p>Eight studies were included <a href="#r2" class="usa-link">2</a>, <a href="#r3">3</a>.</p>
  </section>
  <p><strong>Selected cohorts.</strong> Cohorts came from <a rid="r1" href="#">1</a>.</p>
</section>
<section class="tw" id="T1">
  <h3 class="obj_head">Table 1.</h3>
  <div class="caption"><p>Characteristics of included studies</p></div>
  <table>
    <thead><tr><th>Study</th><th>N</th></tr></thead>
    <tbody>
      <tr><td>Wong <a href="#r3">3</a></td><td>40</td></tr>
      <tr><th scope="row">Brady</th><td>12 <a href="#r1">1</a></td></tr>
      <tr><td>Pooled</td><td>52</td></tr>
    </tbody>
  </table>
</section>
<section class="ref-list"><h2>References</h2>
<ul class="ref-list">
  <li id="r1"><span class="label">1.</span><cite>Wong T. Retinopathy. JAMA. 2019.</cite>
    [<a href="https://doi.org/10.1001%2Fjama.2019.1">DOI</a>]
    [<a href="https://pubmed.ncbi.nlm.nih.gov/31234567/">PubMed</a>]
    [<a href="/pmc/articles/PMC6543210/">PMC free article</a>]</li>
  <li id="r2"><cite>Brady C. Pregnancy outcomes. doi:10.1016/j.ajo.2020.02.003.</cite></li>
  <li id="r3"><cite>Stafford D. Cohort study.</cite> [<a href="https://pubmed.ncbi.nlm.nih.gov/22222222">PubMed</a>]</li>
</ul>
</section>
</body></html>
"##;

    #[test]
    fn test_parses_reference_list_in_order() {
        let article = ParsedArticle::parse(ARTICLE);
        assert_eq!(article.references.len(), 3);
        let first = &article.references[0];
        assert_eq!(first.position, 1);
        assert_eq!(first.anchor_id, "r1");
        assert_eq!(first.doi.as_deref(), Some("10.1001/jama.2019.1"));
        assert_eq!(first.pmid.as_deref(), Some("31234567"));
        assert_eq!(first.pmcid.as_deref(), Some("PMC6543210"));
        assert!(first.text.starts_with("1. Wong T. Retinopathy."));

        let second = &article.references[1];
        assert_eq!(second.doi.as_deref(), Some("10.1016/j.ajo.2020.02.003"));
        assert_eq!(second.pmid, None);
        assert_eq!(article.references[2].pmid.as_deref(), Some("22222222"));
    }

    #[test]
    fn test_parses_captioned_table_body_anchors() {
        let article = ParsedArticle::parse(ARTICLE);
        assert_eq!(article.tables.len(), 1);
        let table = &article.tables[0];
        assert_eq!(table.caption, "Table 1. Characteristics of included studies");
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0], vec![vec!["r3".to_string()], vec![]]);
        assert_eq!(table.rows[1], vec![vec![], vec!["r1".to_string()]]);
    }

    #[test]
    fn test_parses_results_blocks() {
        let article = ParsedArticle::parse(ARTICLE);
        let headings: Vec<&str> = article
            .results_blocks
            .iter()
            .map(|b| b.heading.as_str())
            .collect();
        assert!(headings.contains(&"Study Selection"));
        assert!(headings.contains(&"Characteristics of Included Studies"));
        assert!(headings.contains(&"Selected cohorts."));

        let included = article
            .results_blocks
            .iter()
            .find(|b| b.heading == "Characteristics of Included Studies")
            .unwrap();
        assert_eq!(included.anchors, vec!["r2".to_string(), "r3".to_string()]);
        assert!(included.text.contains("Eight studies were included"));
    }

    #[test]
    fn test_reference_positions_lookup() {
        let article = ParsedArticle::parse(ARTICLE);
        let positions = article.reference_positions();
        assert_eq!(positions.get("r2"), Some(&2));
        assert_eq!(article.reference(3).unwrap().anchor_id, "r3");
        assert!(article.reference(0).is_none());
        assert!(article.reference(4).is_none());
    }

    #[test]
    fn test_bare_table_with_caption() {
        let html = r##"<table><caption>Included studies</caption>
            <tr><th>Study</th></tr>
            <tr><td><a href="#B7">7</a></td></tr></table>
            <div class="ref-cit-blk" id="B7">Seventh reference</div>"##;
        let article = ParsedArticle::parse(html);
        assert_eq!(article.tables[0].caption, "Included studies");
        assert_eq!(article.tables[0].rows, vec![vec![vec!["B7".to_string()]]]);
        assert_eq!(article.references[0].anchor_id, "B7");
    }

    #[test]
    fn test_numbered_results_heading() {
        let html = r##"<section><h2>2. Methods</h2><p>Searched.</p></section>
            <section><h2>3. Results</h2>
              <section><h3>3.1. Included Studies</h3><p>Twelve studies <a href="#B1">1</a>.</p></section>
            </section>
            <ol class="references"><li id="B1">First</li></ol>"##;
        let article = ParsedArticle::parse(html);
        assert_eq!(article.results_blocks.len(), 2);
        assert_eq!(article.results_blocks[0].heading, "3.1. Included Studies");
        assert_eq!(article.results_blocks[0].anchors, vec!["B1".to_string()]);

        for heading in ["III. RESULTS", "Results and Discussion", "4 Results"] {
            assert!(RESULTS_HEADING.is_match(heading), "{}", heading);
        }
        for heading in ["Methods", "Resultsx", "Discussion of results"] {
            assert!(!RESULTS_HEADING.is_match(heading), "{}", heading);
        }
    }

    #[test]
    fn test_article_without_results_or_references() {
        let article = ParsedArticle::parse("<html><body><p>Nothing here</p></body></html>");
        assert!(article.references.is_empty());
        assert!(article.tables.is_empty());
        assert!(article.results_blocks.is_empty());
    }
}
