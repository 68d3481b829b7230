//! Table mining for PDF supplements
//!
//! Works on pages already split into positioned tokens and raw grids:
//! 1. caption detection by shared vertical position
//! 2. fragment merging with header de-duplication
//! 3. the continuation state machine that stitches multi-page tables
//!
//! A category pass only runs on documents whose first page passes
//! [`screen_document`].

pub mod caption;
pub mod continuation;
pub mod merge;

pub use caption::{detect_caption, detect_caption_excluding, take_caption, SeenPositions, DEFAULT_CAPTION_MARKER};
pub use continuation::{mine_category, screen_document, ContinuationMachine, MachineState};
pub use merge::merge_fragments;
