use std::path::Path;

use anyhow::Result;
use log::debug;

use crate::domain::entities::grid::Grid;
use crate::infra::import::csv::load_csv_grid;
use crate::infra::import::xlsx::load_workbook_grid;
use crate::usecase::ports::collaborators::GridSource;

/// Loads grids from local files, choosing the reader by extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileGridSource;

impl GridSource for FileGridSource {
    fn load_grid(&self, file_path: &str, sheet_name: Option<&str>) -> Result<Grid> {
        let path = Path::new(file_path);
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

        let sheet_name = sheet_name.map(str::trim).filter(|name| !name.is_empty());
        let grid = if is_csv {
            load_csv_grid(path)?
        } else {
            load_workbook_grid(path, sheet_name)?
        };
        debug!(
            "loaded {} x {} grid from {}",
            grid.nrows(),
            grid.ncols(),
            path.display()
        );
        Ok(grid)
    }
}
