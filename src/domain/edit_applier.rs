use crate::domain::entities::edit::{EditOperation, ALL_SECTIONS};
use crate::domain::entities::section::{default_section_label, resolve_section_id, Section};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub sections: Vec<Section>,
    /// False when the operation targeted nothing and the list is unchanged.
    pub applied: bool,
}

impl EditOutcome {
    fn unchanged(sections: &[Section]) -> Self {
        Self {
            sections: sections.to_vec(),
            applied: false,
        }
    }

    fn changed(sections: Vec<Section>) -> Self {
        Self {
            sections,
            applied: true,
        }
    }
}

/// Applies one edit to a section list without touching the input. Relative
/// order of the remaining sections is preserved.
pub fn apply_edit(sections: &[Section], operation: &EditOperation) -> EditOutcome {
    match operation {
        EditOperation::SetHeaderRow { value } => {
            let updated = sections
                .iter()
                .cloned()
                .map(|mut section| {
                    section.header_row = *value;
                    section
                })
                .collect();
            EditOutcome::changed(updated)
        }
        EditOperation::MergeSections { ids } => merge_pair(sections, ids),
        EditOperation::RenameSection { id, label } => update_one(sections, id, |section| {
            section.label = Some(label.clone());
        }),
        EditOperation::RemoveSection { id } => match resolve_section_id(id, sections.len()) {
            Some(idx) => {
                let mut updated = sections.to_vec();
                updated.remove(idx);
                EditOutcome::changed(updated)
            }
            None => EditOutcome::unchanged(sections),
        },
        EditOperation::SetStartRow { id, value } => update_one(sections, id, |section| {
            section.start_row = *value;
        }),
        EditOperation::SetEndRow { id, value } => update_one(sections, id, |section| {
            section.end_row = *value;
        }),
        EditOperation::SetRange { id, start, end } => update_one(sections, id, |section| {
            section.start_row = *start;
            section.end_row = *end;
        }),
        EditOperation::SetGroupBy { id, column } => {
            let column = column.trim().to_string();
            if id.trim() == ALL_SECTIONS {
                let updated = sections
                    .iter()
                    .cloned()
                    .map(|mut section| {
                        section.group_by = Some(column.clone());
                        section
                    })
                    .collect();
                EditOutcome::changed(updated)
            } else {
                update_one(sections, id, |section| {
                    section.group_by = Some(column.clone());
                })
            }
        }
        EditOperation::ShowPreview => EditOutcome::unchanged(sections),
    }
}

fn update_one(
    sections: &[Section],
    id: &str,
    mutate: impl FnOnce(&mut Section),
) -> EditOutcome {
    match resolve_section_id(id, sections.len()) {
        Some(idx) => {
            let mut updated = sections.to_vec();
            mutate(&mut updated[idx]);
            EditOutcome::changed(updated)
        }
        None => EditOutcome::unchanged(sections),
    }
}

/// Only pairs merge. The merged span covers both inputs and takes the place
/// of the earlier one.
fn merge_pair(sections: &[Section], ids: &[String]) -> EditOutcome {
    let [first_id, second_id] = ids else {
        return EditOutcome::unchanged(sections);
    };
    let (Some(first), Some(second)) = (
        resolve_section_id(first_id, sections.len()),
        resolve_section_id(second_id, sections.len()),
    ) else {
        return EditOutcome::unchanged(sections);
    };
    if first == second {
        return EditOutcome::unchanged(sections);
    }

    let a = &sections[first];
    let b = &sections[second];
    let label = a
        .label
        .clone()
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| default_section_label(first));
    let merged = Section {
        start_row: a.start_row.min(b.start_row),
        end_row: a.end_row.max(b.end_row),
        header_row: a.header_row.min(b.header_row),
        label: Some(label),
        group_by: a.group_by.clone().or_else(|| b.group_by.clone()),
    };

    let mut updated: Vec<Section> = sections
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != first && *idx != second)
        .map(|(_, section)| section.clone())
        .collect();
    updated.insert(first.min(second), merged);
    EditOutcome::changed(updated)
}
