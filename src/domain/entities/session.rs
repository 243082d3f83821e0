use serde::{Deserialize, Serialize};

use crate::domain::entities::section::Section;

/// State of one upload/preview/chat/confirm interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub file_path: String,
    #[serde(default)]
    pub sheet_name: Option<String>,
    #[serde(default)]
    pub auto_sections: Vec<Section>,
    #[serde(default)]
    pub confirmed_sections: Vec<Section>,
    #[serde(default)]
    pub used_rule: bool,
    #[serde(default)]
    pub fingerprint: String,
    /// Mirrors the store's confirm lock; the store column is authoritative.
    #[serde(default)]
    pub confirming: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Session {
    /// Confirmed sections when present, otherwise the live preview.
    pub fn working_sections(&self) -> &[Section] {
        if self.confirmed_sections.is_empty() {
            &self.auto_sections
        } else {
            &self.confirmed_sections
        }
    }
}
