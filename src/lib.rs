//! Evidence mining for systematic reviews
//!
//! Pulls quality-assessment and search-strategy tables out of supplement
//! PDFs, finds a meta-analysis's included studies in its article body, and
//! locates a full-text source for each of them.

pub mod ai_client;
pub mod error;
pub mod model;
pub mod oracle;
pub mod pages;
pub mod papers;
pub mod pipeline;
pub mod settings;
pub mod tables;

pub use error::{MinerError, Result};
pub use model::{Caption, Citation, LogicalTable, Page, ResolvedSource, SourceMethod, TableCategory, TableFragment, Token};
pub use pipeline::{DocumentInput, DocumentRecord, Miner, RecordWriter};
