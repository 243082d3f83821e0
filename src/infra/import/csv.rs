use std::path::Path;

use anyhow::{Context, Result};
use csv::StringRecord;

use crate::domain::entities::grid::{parse_cell, Grid};

/// Reads every physical line as a grid row; nothing is taken as a header.
/// Empty lines, which the csv reader skips, come back as blank rows so row
/// indices keep matching the file.
pub fn load_csv_grid(csv_path: &Path) -> Result<Grid> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("failed to open csv: {}", csv_path.display()))?;

    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    // 1-based line where the next record would start if nothing was skipped
    let mut next_line: u64 = 1;
    loop {
        let has_record = reader.read_record(&mut record).with_context(|| {
            format!(
                "failed to parse csv record {}: {}",
                rows.len(),
                csv_path.display()
            )
        })?;
        if !has_record {
            break;
        }

        let line = record
            .position()
            .map(|position| position.line())
            .unwrap_or(next_line);
        for _ in next_line..line {
            rows.push(Vec::new());
        }
        rows.push(record.iter().map(parse_cell).collect());

        // a quoted field may span lines; the reader position is past them
        next_line = (line + 1).max(reader.position().line());
    }

    Ok(Grid::new(rows))
}
