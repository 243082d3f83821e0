use std::fmt;

/// One spreadsheet cell as delivered by a grid loader.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// Missing value. A text cell holding only whitespace is not missing.
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Present and non-blank once trimmed.
    pub fn is_filled(&self) -> bool {
        match self {
            Cell::Empty => false,
            Cell::Number(_) => true,
            Cell::Text(value) => !value.trim().is_empty(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Cell::Number(_))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            Cell::Number(value) => write!(f, "{value}"),
            Cell::Text(value) => write!(f, "{value}"),
        }
    }
}

/// Rectangular, 0-based cell grid. No row is treated as a header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
    ncols: usize,
}

impl Grid {
    /// Builds a grid, padding short rows with empty cells.
    pub fn new(mut rows: Vec<Vec<Cell>>) -> Self {
        let ncols = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(ncols, Cell::Empty);
        }
        Self { rows, ncols }
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Display strings of the first non-blank row, used as the column layout
    /// identity of the grid.
    pub fn header_names(&self) -> Vec<String> {
        self.rows
            .iter()
            .find(|row| !row.iter().all(Cell::is_missing))
            .map(|row| row.iter().map(ToString::to_string).collect())
            .unwrap_or_default()
    }
}

impl From<Vec<Vec<&str>>> for Grid {
    /// Convenience for literal grids: `""` is empty, numeric text is a number.
    fn from(rows: Vec<Vec<&str>>) -> Self {
        Grid::new(
            rows.into_iter()
                .map(|row| row.into_iter().map(parse_cell).collect())
                .collect(),
        )
    }
}

/// Types a raw textual value the way delimited files are read.
pub fn parse_cell(raw: &str) -> Cell {
    if raw.is_empty() {
        return Cell::Empty;
    }
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Cell::Number(value),
        _ => Cell::Text(raw.to_string()),
    }
}
