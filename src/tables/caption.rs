//! Caption/title detection from positioned page tokens
//!
//! A caption is the whole text line that carries a caption marker such as
//! "eTable". Lines are identified purely by sharing the marker token's
//! vertical position.

use std::collections::HashSet;

use crate::model::{Caption, Token};

/// Marker used by JAMA-style supplements
pub const DEFAULT_CAPTION_MARKER: &str = "eTable";

/// Vertical positions already consumed as captions on the current page.
///
/// A page can hold several captioned grids; each detection records its line
/// here so the next grid on the same page does not pick it up again. Reset it
/// at every page boundary.
#[derive(Debug, Clone, Default)]
pub struct SeenPositions {
    positions: HashSet<u64>,
}

impl SeenPositions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, position: f64) -> bool {
        self.positions.contains(&position.to_bits())
    }

    pub fn insert(&mut self, position: f64) {
        self.positions.insert(position.to_bits());
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Find the caption line on a page.
///
/// Takes the first token containing `marker` and joins every token on the
/// page at exactly that vertical position, in original order. Returns `None`
/// when no marker is present or the joined line is blank.
pub fn detect_caption(tokens: &[Token], marker: &str) -> Option<Caption> {
    detect_caption_excluding(tokens, marker, &SeenPositions::new())
}

/// Like [`detect_caption`], but ignores marker tokens on lines in `seen`
pub fn detect_caption_excluding(
    tokens: &[Token],
    marker: &str,
    seen: &SeenPositions,
) -> Option<Caption> {
    let anchor = tokens
        .iter()
        .find(|t| t.text.contains(marker) && !seen.contains(t.vertical_position))?;
    let position = anchor.vertical_position;

    let text = tokens
        .iter()
        .filter(|t| t.vertical_position == position)
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    if text.trim().is_empty() {
        return None;
    }

    Some(Caption {
        text,
        vertical_position: position,
        page_index: anchor.page_index,
    })
}

/// Detect the next unconsumed caption and mark its line as seen
pub fn take_caption(tokens: &[Token], marker: &str, seen: &mut SeenPositions) -> Option<Caption> {
    let caption = detect_caption_excluding(tokens, marker, seen)?;
    seen.insert(caption.vertical_position);
    Some(caption)
}
