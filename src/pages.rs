//! Page sources for the table miner
//!
//! PDF layout analysis happens outside this crate. Its output is a JSON array
//! with one object per page:
//!
//! ```json
//! [{"tokens": [{"text": "eTable", "top": 72.1}], "tables": [[["Author", null]]]}]
//! ```
//!
//! A table may also be written as `{"rows": [...], "top": 90.0}` to keep its
//! position on the page.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::model::{Cell, Page, TableFragment, Token};

/// Turns a document into ordered pages of tokens and table grids
pub trait PageParser: Send + Sync {
    fn parse(&self, document: &Path) -> Result<Vec<Page>>;
}

#[derive(Debug, Deserialize)]
struct RawToken {
    text: String,
    #[serde(alias = "vertical_position")]
    top: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTable {
    Grid(Vec<Vec<Cell>>),
    Positioned {
        rows: Vec<Vec<Cell>>,
        #[serde(default, alias = "origin_position")]
        top: f64,
    },
}

#[derive(Debug, Default, Deserialize)]
struct RawPage {
    #[serde(default)]
    tokens: Vec<RawToken>,
    #[serde(default)]
    tables: Vec<RawTable>,
}

impl RawPage {
    fn into_page(self, index: usize) -> Page {
        Page {
            index,
            tokens: self
                .tokens
                .into_iter()
                .map(|t| Token::new(t.text, t.top, index))
                .collect(),
            table_fragments: self
                .tables
                .into_iter()
                .map(|table| {
                    let (rows, origin_position) = match table {
                        RawTable::Grid(rows) => (rows, 0.0),
                        RawTable::Positioned { rows, top } => (rows, top),
                    };
                    TableFragment {
                        rows,
                        page_index: index,
                        origin_position,
                    }
                })
                .collect(),
        }
    }
}

/// Parse pre-extracted page JSON; page indices follow array order
pub fn pages_from_json(json: &str) -> Result<Vec<Page>> {
    let raw: Vec<RawPage> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(index, page)| page.into_page(index))
        .collect())
}

/// Reads page JSON files written by an external layout parser
#[derive(Debug, Clone, Default)]
pub struct JsonPages;

impl PageParser for JsonPages {
    fn parse(&self, document: &Path) -> Result<Vec<Page>> {
        pages_from_json(&fs::read_to_string(document)?)
    }
}
