use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::entities::section::{section_display_id, Section};

/// A remembered recipe for reproducing sections on grids that share a
/// fingerprint. Stored untagged; the variants are told apart by
/// `type: "structured"` versus the presence of `overrides`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    Structured(StructuredRule),
    Overrides(OverridesRule),
}

impl Rule {
    pub fn version(&self) -> i64 {
        match self {
            Rule::Structured(rule) => rule.version,
            Rule::Overrides(rule) => rule.version,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Rule::Structured(_) => "structured",
            Rule::Overrides(_) => "overrides",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredTag {
    Structured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBaseTag {
    Zero,
}

/// Verbatim replay of a confirmed section list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRule {
    pub version: i64,
    #[serde(rename = "type")]
    pub kind: StructuredTag,
    pub index_base: IndexBaseTag,
    pub header_row: usize,
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl StructuredRule {
    pub fn new(sections: Vec<Section>, version: i64) -> Self {
        let header_row = sections.first().map(|s| s.header_row).unwrap_or(0);
        Self {
            version,
            kind: StructuredTag::Structured,
            index_base: IndexBaseTag::Zero,
            header_row,
            sections,
            updated_at: None,
        }
    }
}

/// Patch layered on top of a fresh detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverridesRule {
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub updated_at: i64,
    pub overrides: Overrides,
}

impl OverridesRule {
    pub fn empty(now: i64) -> Self {
        Self {
            version: 0,
            updated_at: now,
            overrides: Overrides::default(),
        }
    }

    /// Pins every confirmed section by position. A single shared header row
    /// also becomes the global default.
    pub fn from_confirmed(sections: &[Section], now: i64) -> Self {
        let headers: BTreeSet<usize> = sections.iter().map(|s| s.header_row).collect();
        let header_row = if headers.len() == 1 {
            headers.into_iter().next()
        } else {
            None
        };

        let entries = sections
            .iter()
            .enumerate()
            .map(|(idx, section)| OverrideEntry {
                selector: Selector::index(section_display_id(idx)),
                fields: OverrideFields {
                    start_row: Some(section.start_row),
                    end_row: Some(section.end_row),
                    header_row: Some(section.header_row),
                    label: section.label.clone().filter(|label| !label.is_empty()),
                },
            })
            .collect();

        Self {
            version: now,
            updated_at: now,
            overrides: Overrides {
                header_row,
                sections: entries,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(default)]
    pub header_row: Option<usize>,
    #[serde(default)]
    pub sections: Vec<OverrideEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub selector: Selector,
    #[serde(default)]
    pub fields: OverrideFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OverrideFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl OverrideFields {
    pub fn is_empty(&self) -> bool {
        self.start_row.is_none()
            && self.end_row.is_none()
            && self.header_row.is_none()
            && self.label.is_none()
    }

    pub fn apply_to(&self, section: &mut Section) {
        if let Some(start_row) = self.start_row {
            section.start_row = start_row;
        }
        if let Some(end_row) = self.end_row {
            section.end_row = end_row;
        }
        if let Some(header_row) = self.header_row {
            section.header_row = header_row;
        }
        if let Some(label) = &self.label {
            section.label = Some(label.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    Index,
    Label,
}

/// Picks sections either by 1-based display id (`"S2"`) or by exact label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub by: SelectorKind,
    pub value: String,
}

impl Selector {
    pub fn index(value: impl Into<String>) -> Self {
        Self {
            by: SelectorKind::Index,
            value: value.into(),
        }
    }

    pub fn label(value: impl Into<String>) -> Self {
        Self {
            by: SelectorKind::Label,
            value: value.into(),
        }
    }
}
