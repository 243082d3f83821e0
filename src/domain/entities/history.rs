use serde::{Deserialize, Serialize};

use crate::domain::index::IndexBase;

/// How a confirm step chose to remember the sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnMethod {
    /// A synthesized rule that reproduced the sections on trial.
    Synthesized,
    OverridesFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HistoryEvent {
    Edit {
        session_id: String,
        operation: String,
        applied: bool,
        reply: String,
    },
    Confirm {
        session_id: String,
        sections_count: usize,
        auto_learned_rule: bool,
        rule_version: Option<i64>,
        learn_method: Option<LearnMethod>,
        index_base: IndexBase,
        promoted: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub user_id: String,
    pub created_at: i64,
    #[serde(flatten)]
    pub event: HistoryEvent,
}
