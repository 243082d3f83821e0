use serde::{Deserialize, Serialize};

/// A validated section: 0-based, `end_row` inclusive,
/// `header_row <= start_row <= end_row`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub start_row: usize,
    pub end_row: usize,
    pub header_row: usize,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
}

impl Section {
    pub fn new(header_row: usize, start_row: usize, end_row: usize) -> Self {
        Self {
            start_row,
            end_row,
            header_row,
            label: None,
            group_by: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A section as supplied from outside: indices may be 1-based, negative or
/// out of range until normalized and validated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SectionDraft {
    #[serde(default)]
    pub start_row: i64,
    #[serde(default)]
    pub end_row: i64,
    #[serde(default)]
    pub header_row: i64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
}

impl SectionDraft {
    pub fn new(header_row: i64, start_row: i64, end_row: i64) -> Self {
        Self {
            start_row,
            end_row,
            header_row,
            label: None,
            group_by: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl From<&Section> for SectionDraft {
    fn from(section: &Section) -> Self {
        Self {
            start_row: section.start_row as i64,
            end_row: section.end_row as i64,
            header_row: section.header_row as i64,
            label: section.label.clone(),
            group_by: section.group_by.clone(),
        }
    }
}

impl From<Section> for SectionDraft {
    fn from(section: Section) -> Self {
        SectionDraft::from(&section)
    }
}

pub fn to_drafts(sections: &[Section]) -> Vec<SectionDraft> {
    sections.iter().map(SectionDraft::from).collect()
}

/// Resolves a display identifier (`"S2"`, `"s2"`, `"2"`) to a 0-based list
/// position. Returns `None` when it does not parse or falls outside `len`.
pub fn resolve_section_id(id: &str, len: usize) -> Option<usize> {
    let trimmed = id.trim();
    let digits = trimmed
        .strip_prefix('S')
        .or_else(|| trimmed.strip_prefix('s'))
        .unwrap_or(trimmed);
    let number: usize = digits.parse().ok()?;
    let idx = number.checked_sub(1)?;
    (idx < len).then_some(idx)
}

/// Display identifier for a 0-based position.
pub fn section_display_id(idx: usize) -> String {
    format!("S{}", idx + 1)
}

pub fn default_section_label(idx: usize) -> String {
    format!("Section {}", idx + 1)
}
