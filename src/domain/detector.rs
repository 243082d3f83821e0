//! Row-classification state machine that splits a grid into sections.
//!
//! A section opens on a header row and absorbs data rows until a blank row,
//! a sparse row or the end of the grid closes it.

use log::debug;

use crate::domain::entities::grid::{Cell, Grid};
use crate::domain::entities::section::Section;

const MIN_HEADER_TEXT_CELLS: usize = 2;
const MIN_HEADER_TEXT_LEN: usize = 2;
const MIN_DATA_CELLS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Blank,
    Header,
    Data,
    Sparse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingHeader,
    InSection { header_row: usize, start_row: usize },
}

/// At least two text cells of two or more characters and no numbers.
pub fn is_header_row(row: &[Cell]) -> bool {
    let mut text_cells = 0;
    for cell in row {
        match cell {
            Cell::Empty => {}
            Cell::Number(_) => return false,
            Cell::Text(value) => {
                let trimmed = value.trim();
                if trimmed.chars().count() >= MIN_HEADER_TEXT_LEN {
                    text_cells += 1;
                }
            }
        }
    }
    text_cells >= MIN_HEADER_TEXT_CELLS
}

/// At least two non-blank cells of any type.
pub fn is_data_row(row: &[Cell]) -> bool {
    row.iter().filter(|cell| cell.is_filled()).take(MIN_DATA_CELLS).count() >= MIN_DATA_CELLS
}

pub fn is_blank_row(row: &[Cell]) -> bool {
    row.iter().all(Cell::is_missing)
}

fn classify(row: &[Cell]) -> RowKind {
    if is_blank_row(row) {
        RowKind::Blank
    } else if is_header_row(row) {
        RowKind::Header
    } else if is_data_row(row) {
        RowKind::Data
    } else {
        RowKind::Sparse
    }
}

struct SectionSink {
    sections: Vec<Section>,
}

impl SectionSink {
    /// Appends `[start_row, end_row]` unless it is empty. Only appended
    /// sections advance the label counter.
    fn close(&mut self, header_row: usize, start_row: usize, end_row: Option<usize>) {
        let Some(end_row) = end_row.filter(|end| *end >= start_row) else {
            debug!("discarding empty section opened by header row {header_row}");
            return;
        };
        let label = format!("Section {}", self.sections.len() + 1);
        self.sections
            .push(Section::new(header_row, start_row, end_row).with_label(label));
    }
}

/// Detects sections in a grid. Never fails; an undetectable grid yields an
/// empty list. Output is 0-based with inclusive `end_row`.
pub fn detect_sections(grid: &Grid) -> Vec<Section> {
    let mut sink = SectionSink {
        sections: Vec::new(),
    };
    let mut state = State::SeekingHeader;

    for (idx, row) in grid.rows().enumerate() {
        let kind = classify(row);
        state = match (state, kind) {
            (State::SeekingHeader, RowKind::Header) => State::InSection {
                header_row: idx,
                start_row: idx + 1,
            },
            (State::SeekingHeader, _) => State::SeekingHeader,
            // a header-looking row carries at least two filled cells, so it
            // is absorbed like any data row
            (State::InSection { .. }, RowKind::Data | RowKind::Header) => state,
            (
                State::InSection {
                    header_row,
                    start_row,
                },
                RowKind::Blank | RowKind::Sparse,
            ) => {
                sink.close(header_row, start_row, idx.checked_sub(1));
                State::SeekingHeader
            }
        };
    }

    if let State::InSection {
        header_row,
        start_row,
    } = state
    {
        sink.close(header_row, start_row, grid.nrows().checked_sub(1));
    }

    debug!(
        "detected {} section(s) in {} row(s)",
        sink.sections.len(),
        grid.nrows()
    );
    sink.sections
}
