use anyhow::Result;

use crate::domain::entities::grid::Grid;
use crate::domain::entities::rule::{Rule, StructuredRule};
use crate::domain::entities::section::Section;

/// Delivers the cell grid of an uploaded file.
pub trait GridSource: Send + Sync {
    fn load_grid(&self, file_path: &str, sheet_name: Option<&str>) -> Result<Grid>;
}

/// Proposes a reusable rule from confirmed sections. Any proposal is
/// trial-applied before it is stored.
pub trait RuleSynthesizer: Send + Sync {
    fn synthesize(&self, grid: &Grid, sections: &[Section], version: i64) -> Result<Option<Rule>>;
}

/// Remembers the confirmed sections verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaySynthesizer;

impl RuleSynthesizer for ReplaySynthesizer {
    fn synthesize(&self, _grid: &Grid, sections: &[Section], version: i64) -> Result<Option<Rule>> {
        if sections.is_empty() {
            return Ok(None);
        }
        Ok(Some(Rule::Structured(StructuredRule::new(
            sections.to_vec(),
            version,
        ))))
    }
}
