use serde::{Deserialize, Serialize};

use crate::domain::entities::candidate::{PatchFields, PatchOp};
use crate::domain::entities::rule::Selector;
use crate::domain::entities::section::{resolve_section_id, section_display_id};

/// Marks `set_group_by` as targeting every section.
pub const ALL_SECTIONS: &str = "*";

/// A structured edit produced by the natural-language collaborator.
/// Section ids are 1-based display ids such as `"S2"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOperation {
    SetHeaderRow { value: usize },
    MergeSections { ids: Vec<String> },
    RenameSection { id: String, label: String },
    RemoveSection { id: String },
    SetStartRow { id: String, value: usize },
    SetEndRow { id: String, value: usize },
    SetRange { id: String, start: usize, end: usize },
    SetGroupBy { id: String, column: String },
    ShowPreview,
}

impl EditOperation {
    pub fn name(&self) -> &'static str {
        match self {
            EditOperation::SetHeaderRow { .. } => "set_header_row",
            EditOperation::MergeSections { .. } => "merge_sections",
            EditOperation::RenameSection { .. } => "rename_section",
            EditOperation::RemoveSection { .. } => "remove_section",
            EditOperation::SetStartRow { .. } => "set_start_row",
            EditOperation::SetEndRow { .. } => "set_end_row",
            EditOperation::SetRange { .. } => "set_range",
            EditOperation::SetGroupBy { .. } => "set_group_by",
            EditOperation::ShowPreview => "show_preview",
        }
    }

    /// The rule patch this edit teaches, if it is a structural edit.
    pub fn to_patch_op(&self) -> Option<PatchOp> {
        let op = match self {
            EditOperation::SetHeaderRow { value } => PatchOp::UpdateAll {
                fields: PatchFields {
                    header_row: Some(*value),
                    ..PatchFields::default()
                },
            },
            EditOperation::MergeSections { ids } => PatchOp::Merge {
                section_ids: ids.iter().map(|id| canonical_id(id)).collect(),
            },
            EditOperation::RenameSection { id, label } => PatchOp::Rename {
                selector: Selector::index(canonical_id(id)),
                fields: PatchFields {
                    label: Some(label.clone()),
                    ..PatchFields::default()
                },
            },
            EditOperation::RemoveSection { id } => PatchOp::Delete {
                selector: Selector::index(canonical_id(id)),
            },
            EditOperation::SetStartRow { id, value } => PatchOp::Update {
                selector: Selector::index(canonical_id(id)),
                fields: PatchFields {
                    start_row: Some(*value),
                    ..PatchFields::default()
                },
            },
            EditOperation::SetEndRow { id, value } => PatchOp::Update {
                selector: Selector::index(canonical_id(id)),
                fields: PatchFields {
                    end_row: Some(*value),
                    ..PatchFields::default()
                },
            },
            EditOperation::SetRange { id, start, end } => PatchOp::Update {
                selector: Selector::index(canonical_id(id)),
                fields: PatchFields {
                    start_row: Some(*start),
                    end_row: Some(*end),
                    ..PatchFields::default()
                },
            },
            EditOperation::SetGroupBy { id, column } if id.trim() == ALL_SECTIONS => {
                PatchOp::UpdateAll {
                    fields: PatchFields {
                        group_by: Some(column.trim().to_string()),
                        ..PatchFields::default()
                    },
                }
            }
            EditOperation::SetGroupBy { id, column } => PatchOp::Update {
                selector: Selector::index(canonical_id(id)),
                fields: PatchFields {
                    group_by: Some(column.trim().to_string()),
                    ..PatchFields::default()
                },
            },
            EditOperation::ShowPreview => return None,
        };
        Some(op)
    }
}

/// `"2"`, `"s2"` and `"S2"` all record as `"S2"`.
fn canonical_id(id: &str) -> String {
    match resolve_section_id(id, usize::MAX) {
        Some(idx) => section_display_id(idx),
        None => id.trim().to_string(),
    }
}
