use std::path::Path;

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};

use crate::domain::entities::grid::{Cell, Grid};

pub fn data_to_cell(cell: &Data) -> Cell {
    match cell {
        Data::String(v) if v.is_empty() => Cell::Empty,
        Data::String(v) => Cell::Text(v.to_string()),
        Data::Float(v) => Cell::Number(*v),
        Data::Int(v) => Cell::Number(*v as f64),
        Data::Bool(v) => Cell::Text(v.to_string()),
        Data::DateTime(v) => Cell::Text(v.to_string()),
        Data::DateTimeIso(v) => Cell::Text(v.to_string()),
        Data::DurationIso(v) => Cell::Text(v.to_string()),
        Data::Error(v) => Cell::Text(format!("{v:?}")),
        Data::Empty => Cell::Empty,
    }
}

/// Loads one sheet (the first when `sheet_name` is `None`) of any workbook
/// format calamine understands.
pub fn load_workbook_grid(path: &Path, sheet_name: Option<&str>) -> Result<Grid> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook: {}", path.display()))?;

    let range = match sheet_name {
        Some(name) => workbook
            .worksheet_range(name)
            .with_context(|| format!("failed to read sheet: {name}"))?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow!("workbook has no sheets: {}", path.display()))?
            .context("failed to read first sheet")?,
    };

    Ok(range_to_grid(&range))
}

/// Keeps physical row numbers: a used range starting below A1 is padded
/// with blank leading rows and columns.
fn range_to_grid(range: &Range<Data>) -> Grid {
    let (row_offset, col_offset) = range
        .start()
        .map(|(row, col)| (row as usize, col as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<Cell>> = (0..row_offset).map(|_| Vec::new()).collect();
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; col_offset];
        cells.extend(row.iter().map(data_to_cell));
        rows.push(cells);
    }
    Grid::new(rows)
}
