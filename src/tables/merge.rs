//! Fragment merging
//!
//! Cells are normalized before header comparison, so a header that wraps
//! differently on a later page still counts as a repeat.

use crate::model::{Cell, TableFragment};

/// Replace embedded line breaks in a cell with single spaces
pub fn normalize_cell(cell: &Cell) -> Cell {
    cell.as_ref().map(|text| {
        text.split(['\n', '\r'])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    })
}

pub fn normalize_row(row: &[Cell]) -> Vec<Cell> {
    row.iter().map(normalize_cell).collect()
}

/// Stitch per-page grids of one table into a single grid.
///
/// The first fragment's first row is the header. A later fragment's first
/// row is dropped only when it repeats that header; every other row is kept.
pub fn merge_fragments(fragments: &[TableFragment]) -> Vec<Vec<Cell>> {
    let mut merged: Vec<Vec<Cell>> = Vec::new();
    let mut header: Option<Vec<Cell>> = None;

    for fragment in fragments {
        let mut rows = fragment.rows.iter().map(|row| normalize_row(row));

        match &header {
            None => {
                let Some(first) = rows.next() else { continue };
                header = Some(first.clone());
                merged.push(first);
            }
            Some(canonical) => {
                if let Some(first) = rows.next() {
                    if &first != canonical {
                        merged.push(first);
                    }
                }
            }
        }
        merged.extend(rows);
    }

    merged
}

/// Build the trailing explanation row, padded to `width` cells
pub fn explanation_row(explanation: &str, width: usize) -> Vec<Cell> {
    let mut row = vec![Some(String::new()); width.max(1)];
    row[0] = Some(explanation.trim().to_string());
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<Cell> {
        cells.iter().map(|c| Some(c.to_string())).collect()
    }

    fn fragment(rows: Vec<Vec<Cell>>, page_index: usize) -> TableFragment {
        TableFragment {
            rows,
            page_index,
            origin_position: 0.0,
        }
    }

    #[test]
    fn test_repeated_header_is_dropped() {
        let header = row(&["Author", "S1", "Score"]);
        let first = fragment(vec![header.clone(), row(&["Wong", "*", "5"]), row(&["Brady", "*", "5"])], 0);
        let second = fragment(vec![header.clone(), row(&["Rizzi", "*", "7"])], 1);

        let merged = merge_fragments(&[first.clone(), second.clone()]);
        assert_eq!(merged.len(), first.rows.len() + second.rows.len() - 1);
        assert_eq!(merged[0], header);
        assert_eq!(merged.iter().filter(|r| **r == header).count(), 1);
        assert_eq!(merged.last().unwrap(), &row(&["Rizzi", "*", "7"]));
    }

    #[test]
    fn test_continuation_without_header_keeps_all_rows() {
        let first = fragment(vec![row(&["Author", "Score"]), row(&["Wong", "5"])], 0);
        let second = fragment(vec![row(&["Brady", "5"]), row(&["Lutas", "4"])], 1);

        let merged = merge_fragments(&[first, second]);
        assert_eq!(merged.len(), 4);
        assert_eq!(merged[2], row(&["Brady", "5"]));
    }

    #[test]
    fn test_header_like_row_later_in_fragment_is_kept() {
        let header = row(&["Author", "Score"]);
        let first = fragment(vec![header.clone(), row(&["Wong", "5"])], 0);
        let second = fragment(vec![row(&["Buda", "4"]), header.clone()], 1);

        let merged = merge_fragments(&[first, second]);
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_cells_are_normalized_before_comparison() {
        let first = fragment(vec![row(&["Quality\nscore", "Author"]), row(&["5", "Wong"])], 0);
        let second = fragment(vec![row(&["Quality score", "Author"]), row(&["4", "Buda"])], 1);

        let merged = merge_fragments(&[first, second]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0][0], Some("Quality score".to_string()));
    }

    #[test]
    fn test_empty_fragments_are_skipped() {
        let empty = fragment(Vec::new(), 0);
        let real = fragment(vec![row(&["A", "B"]), row(&["1", "2"])], 1);
        let merged = merge_fragments(&[empty, real]);
        assert_eq!(merged, vec![row(&["A", "B"]), row(&["1", "2"])]);
    }

    #[test]
    fn test_none_cells_survive() {
        let first = fragment(vec![vec![Some("A".to_string()), None], vec![None, Some("x".to_string())]], 0);
        let merged = merge_fragments(&[first]);
        assert_eq!(merged[1][0], None);
    }

    #[test]
    fn test_explanation_row_is_padded() {
        let row = explanation_row(" S1: representativeness ", 3);
        assert_eq!(
            row,
            vec![Some("S1: representativeness".to_string()), Some(String::new()), Some(String::new())]
        );
        assert_eq!(explanation_row("x", 0).len(), 1);
    }
}
