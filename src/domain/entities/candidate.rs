use serde::{Deserialize, Serialize};

use crate::domain::entities::rule::Selector;

pub const EDIT_SECTIONS_INTENT: &str = "edit_sections";

/// A proposed rule patch observed from chat edits, pending promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub key: String,
    pub patch_spec: PatchSpec,
    pub support_count: u32,
    pub confidence: f64,
    pub created_at: i64,
    pub last_seen: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_at: Option<i64>,
}

impl Candidate {
    pub fn new(key: String, patch_spec: PatchSpec, confidence: f64, now: i64) -> Self {
        Self {
            key,
            patch_spec,
            support_count: 1,
            confidence,
            created_at: now,
            last_seen: now,
            promoted_at: None,
        }
    }

    pub fn is_promoted(&self) -> bool {
        self.promoted_at.is_some()
    }

    /// Another sighting of the same patch.
    pub fn observe(&mut self, confidence: f64, now: i64) {
        self.support_count = self.support_count.saturating_add(1);
        self.confidence = self.confidence.max(confidence);
        self.last_seen = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchSpec {
    #[serde(default = "default_intent")]
    pub intent: String,
    #[serde(default)]
    pub operations: Vec<PatchOp>,
}

fn default_intent() -> String {
    EDIT_SECTIONS_INTENT.to_string()
}

impl PatchSpec {
    pub fn edit_sections(operations: Vec<PatchOp>) -> Self {
        Self {
            intent: default_intent(),
            operations,
        }
    }

    /// Canonical signature: JSON with object keys in sorted order, so two
    /// equal patches always share a key.
    pub fn signature(&self) -> Result<String, serde_json::Error> {
        // serde_json::Map is a BTreeMap without the preserve_order feature
        let value = serde_json::to_value(self)?;
        serde_json::to_string(&value)
    }
}

/// One recorded edit, expressed against the section selectors a rule uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    Update {
        selector: Selector,
        fields: PatchFields,
    },
    UpdateAll {
        fields: PatchFields,
    },
    Rename {
        selector: Selector,
        fields: PatchFields,
    },
    Delete {
        selector: Selector,
    },
    Merge {
        section_ids: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PatchFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
}
