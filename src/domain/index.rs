//! Index-base reconciliation and the structural gate every section list
//! crosses before it is trusted.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::domain::entities::section::{Section, SectionDraft};
use crate::domain::error::SectionError;

/// Row-numbering convention inferred for a list of drafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBase {
    Zero,
    #[serde(rename = "one->zero_auto")]
    One,
}

impl IndexBase {
    /// A 1-based inclusive index may equal `nrows`; a 0-based one never
    /// can. That equality is the only signal used. Anything else is assumed
    /// to be canonical already.
    pub fn detect(drafts: &[SectionDraft], nrows: usize) -> Self {
        let nrows = nrows as i64;
        let one_based = drafts.iter().any(|draft| {
            draft.start_row == nrows || draft.end_row == nrows || draft.header_row == nrows
        });
        if one_based {
            IndexBase::One
        } else {
            IndexBase::Zero
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub base: IndexBase,
    pub drafts: Vec<SectionDraft>,
}

/// Converts drafts to 0-based form, flooring at 0, when they look 1-based.
pub fn normalize_index_base(drafts: &[SectionDraft], nrows: usize) -> Normalized {
    let base = IndexBase::detect(drafts, nrows);
    let drafts = match base {
        IndexBase::Zero => drafts.to_vec(),
        IndexBase::One => {
            debug!("treating {} section(s) as 1-based (nrows={nrows})", drafts.len());
            drafts
                .iter()
                .map(|draft| SectionDraft {
                    start_row: draft.start_row.saturating_sub(1).max(0),
                    end_row: draft.end_row.saturating_sub(1).max(0),
                    header_row: draft.header_row.saturating_sub(1).max(0),
                    label: draft.label.clone(),
                    group_by: draft.group_by.clone(),
                })
                .collect()
        }
    };
    Normalized { base, drafts }
}

/// Enforces `0 <= header_row <= start_row <= end_row <= nrows - 1` on every
/// draft. Labels default to `""`.
pub fn validate_sections(
    drafts: &[SectionDraft],
    nrows: usize,
) -> Result<Vec<Section>, SectionError> {
    if drafts.is_empty() {
        return Err(SectionError::SectionsEmpty);
    }

    let last_row = nrows as i64 - 1;
    drafts
        .iter()
        .map(|draft| {
            let in_range = 0 <= draft.header_row
                && draft.header_row <= draft.start_row
                && draft.start_row <= draft.end_row
                && draft.end_row <= last_row;
            if !in_range {
                return Err(SectionError::IndexOutOfRange {
                    header_row: draft.header_row,
                    start_row: draft.start_row,
                    end_row: draft.end_row,
                    nrows,
                });
            }
            Ok(into_section(draft))
        })
        .collect()
}

/// Ordering-only check for edits made without the grid at hand.
pub fn validate_sections_unbounded(drafts: &[SectionDraft]) -> Result<Vec<Section>, SectionError> {
    if drafts.is_empty() {
        return Err(SectionError::SectionsEmpty);
    }

    drafts
        .iter()
        .map(|draft| {
            let ordered = 0 <= draft.header_row
                && draft.header_row <= draft.start_row
                && draft.start_row <= draft.end_row;
            if !ordered {
                return Err(SectionError::Unordered {
                    header_row: draft.header_row,
                    start_row: draft.start_row,
                    end_row: draft.end_row,
                });
            }
            Ok(into_section(draft))
        })
        .collect()
}

fn into_section(draft: &SectionDraft) -> Section {
    Section {
        start_row: draft.start_row as usize,
        end_row: draft.end_row as usize,
        header_row: draft.header_row as usize,
        label: Some(draft.label.clone().unwrap_or_default()),
        group_by: draft.group_by.clone(),
    }
}

/// Outcome of the validate, then normalize-and-retry sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub base: IndexBase,
    pub sections: Vec<Section>,
}

/// Validates as given; on failure retries once after 1-based
/// reinterpretation. When both fail the first error is returned.
pub fn reconcile_sections(
    drafts: &[SectionDraft],
    nrows: usize,
) -> Result<Reconciled, SectionError> {
    match validate_sections(drafts, nrows) {
        Ok(sections) => Ok(Reconciled {
            base: IndexBase::Zero,
            sections,
        }),
        Err(primary) => {
            let normalized = normalize_index_base(drafts, nrows);
            if normalized.base == IndexBase::Zero {
                return Err(primary);
            }
            validate_sections(&normalized.drafts, nrows)
                .map(|sections| Reconciled {
                    base: IndexBase::One,
                    sections,
                })
                .map_err(|_| primary)
        }
    }
}
