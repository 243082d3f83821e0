use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::domain::edit_applier::apply_edit;
use crate::domain::entities::candidate::PatchSpec;
use crate::domain::entities::edit::{EditOperation, ALL_SECTIONS};
use crate::domain::entities::history::HistoryEvent;
use crate::domain::entities::section::Section;
use crate::unix_now;
use crate::usecase::error::ServiceError;
use crate::usecase::ports::repo::{RuleKey, SessionRepository};
use crate::usecase::services::history_service::HistoryService;
use crate::usecase::services::learning_service::LearningService;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRequest {
    pub operation: EditOperation,
    /// Confidence the interpreter attached to the operation.
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditReply {
    pub session_id: String,
    pub operation: String,
    pub applied: bool,
    pub reply: String,
    pub sections: Vec<Section>,
    pub used_rule: bool,
}

/// Chat-driven edits of a session's preview sections.
pub struct EditService {
    sessions: Arc<dyn SessionRepository>,
    learning: Arc<LearningService>,
    history: Arc<HistoryService>,
    default_confidence: f64,
}

impl EditService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        learning: Arc<LearningService>,
        history: Arc<HistoryService>,
        default_confidence: f64,
    ) -> Self {
        Self {
            sessions,
            learning,
            history,
            default_confidence,
        }
    }

    pub fn apply(&self, session_id: &str, request: EditRequest) -> Result<EditReply, ServiceError> {
        let mut session = self
            .sessions
            .load_session(session_id)?
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))?;

        let operation = &request.operation;
        let outcome = apply_edit(&session.auto_sections, operation);
        let reply = describe(operation, outcome.applied);
        debug!(
            "edit {} on {session_id}: applied={}",
            operation.name(),
            outcome.applied
        );

        if outcome.applied {
            session.auto_sections = outcome.sections;
            session.updated_at = unix_now();
            self.sessions.save_session(&session)?;

            if let Some(op) = operation.to_patch_op() {
                let key = RuleKey::new(session.user_id.as_str(), session.fingerprint.as_str());
                let confidence = request.confidence.unwrap_or(self.default_confidence);
                self.learning
                    .record_edit(&key, &PatchSpec::edit_sections(vec![op]), confidence);
            }
        }

        self.history.record(
            &session.user_id,
            &HistoryEvent::Edit {
                session_id: session.session_id.clone(),
                operation: operation.name().to_string(),
                applied: outcome.applied,
                reply: reply.clone(),
            },
        );

        Ok(EditReply {
            session_id: session.session_id,
            operation: operation.name().to_string(),
            applied: outcome.applied,
            reply,
            sections: session.auto_sections,
            used_rule: session.used_rule,
        })
    }
}

fn describe(operation: &EditOperation, applied: bool) -> String {
    if !applied {
        return match operation {
            EditOperation::ShowPreview => "Here are the current sections.".to_string(),
            _ => format!("Could not apply {}: no matching section.", operation.name()),
        };
    }
    match operation {
        EditOperation::SetHeaderRow { value } => {
            format!("Header row set to {value} for every section.")
        }
        EditOperation::MergeSections { ids } => format!("Merged {}.", ids.join(" and ")),
        EditOperation::RenameSection { id, label } => format!("Renamed {id} to \"{label}\"."),
        EditOperation::RemoveSection { id } => format!("Removed {id}."),
        EditOperation::SetStartRow { id, value } => format!("{id} now starts at row {value}."),
        EditOperation::SetEndRow { id, value } => format!("{id} now ends at row {value}."),
        EditOperation::SetRange { id, start, end } => {
            format!("{id} now spans rows {start} to {end}.")
        }
        EditOperation::SetGroupBy { id, column } if id.trim() == ALL_SECTIONS => {
            format!("Grouping every section by \"{}\".", column.trim())
        }
        EditOperation::SetGroupBy { id, column } => {
            format!("Grouping {id} by \"{}\".", column.trim())
        }
        EditOperation::ShowPreview => "Here are the current sections.".to_string(),
    }
}
