use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::domain::entities::history::HistoryEvent;
use crate::domain::entities::section::{to_drafts, Section, SectionDraft};
use crate::domain::fingerprint::grid_fingerprint;
use crate::domain::index::{reconcile_sections, IndexBase};
use crate::unix_now;
use crate::usecase::error::ServiceError;
use crate::usecase::ports::collaborators::{GridSource, RuleSynthesizer};
use crate::usecase::ports::repo::{RuleKey, SessionRepository};
use crate::usecase::services::history_service::HistoryService;
use crate::usecase::services::learning_service::{LearnedRule, LearningService};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub session_id: String,
    /// Overrides the session owner as the rule owner.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub sheet_name: Option<String>,
    /// Final sections from the client; the session's preview when absent.
    #[serde(default)]
    pub sections: Option<Vec<SectionDraft>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmReport {
    pub session_id: String,
    pub sections: Vec<Section>,
    pub fingerprint: String,
    pub index_base: IndexBase,
    pub learned: Option<LearnedRule>,
    pub promoted: bool,
}

/// Holds the session's confirm lock and releases it when dropped.
struct ConfirmGuard<'a> {
    sessions: &'a dyn SessionRepository,
    session_id: &'a str,
}

impl Drop for ConfirmGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.sessions.end_confirm(self.session_id) {
            warn!("failed to release confirm lock of {}: {err}", self.session_id);
        }
    }
}

pub struct ConfirmService {
    grids: Arc<dyn GridSource>,
    sessions: Arc<dyn SessionRepository>,
    learning: Arc<LearningService>,
    history: Arc<HistoryService>,
    synthesizer: Arc<dyn RuleSynthesizer>,
}

impl ConfirmService {
    pub fn new(
        grids: Arc<dyn GridSource>,
        sessions: Arc<dyn SessionRepository>,
        learning: Arc<LearningService>,
        history: Arc<HistoryService>,
        synthesizer: Arc<dyn RuleSynthesizer>,
    ) -> Self {
        Self {
            grids,
            sessions,
            learning,
            history,
            synthesizer,
        }
    }

    /// Finalizes a session's sections and teaches the rule memory. Only
    /// grid and section problems fail the call; learning and promotion are
    /// best-effort.
    pub fn confirm(&self, request: ConfirmRequest) -> Result<ConfirmReport, ServiceError> {
        let session_id = request.session_id.as_str();
        if self.sessions.load_session(session_id)?.is_none() {
            return Err(ServiceError::SessionNotFound(session_id.to_string()));
        }
        if !self.sessions.try_begin_confirm(session_id)? {
            return Err(ServiceError::ConfirmInProgress(session_id.to_string()));
        }
        let _guard = ConfirmGuard {
            sessions: self.sessions.as_ref(),
            session_id,
        };

        // Reload under the lock so concurrent edits are not lost.
        let mut session = self
            .sessions
            .load_session(session_id)?
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))?;

        let sheet_name = request
            .sheet_name
            .clone()
            .or_else(|| session.sheet_name.clone());
        let grid = self
            .grids
            .load_grid(&session.file_path, sheet_name.as_deref())
            .map_err(|err| ServiceError::Grid(format!("{}: {err:#}", session.file_path)))?;
        if grid.is_empty() {
            return Err(ServiceError::EmptyGrid(session.file_path.clone()));
        }

        let drafts = match request.sections {
            Some(drafts) if !drafts.is_empty() => drafts,
            _ if !session.auto_sections.is_empty() => to_drafts(&session.auto_sections),
            _ => return Err(ServiceError::MissingSections),
        };
        let reconciled = reconcile_sections(&drafts, grid.nrows())?;

        let fingerprint = if sheet_name == session.sheet_name && !session.fingerprint.is_empty() {
            session.fingerprint.clone()
        } else {
            grid_fingerprint(&grid, sheet_name.as_deref())
        };
        let user_id = request
            .user_id
            .clone()
            .filter(|user| !user.trim().is_empty())
            .unwrap_or_else(|| session.user_id.clone());

        session.sheet_name = sheet_name;
        session.fingerprint = fingerprint.clone();
        session.confirmed_sections = reconciled.sections.clone();
        session.updated_at = unix_now();
        self.sessions.save_session(&session)?;

        let key = RuleKey::new(user_id.as_str(), fingerprint.as_str());
        let learned = match self.learning.learn_from_confirmed(
            &key,
            &grid,
            &reconciled.sections,
            self.synthesizer.as_ref(),
        ) {
            Ok(learned) => Some(learned),
            Err(err) => {
                warn!("failed to learn rule for {user_id}/{fingerprint}: {err}");
                None
            }
        };
        let promoted = match self.learning.promote_best_candidates(&key) {
            Ok(promoted) => promoted,
            Err(err) => {
                warn!("candidate promotion failed for {user_id}/{fingerprint}: {err}");
                false
            }
        };
        info!(
            "confirmed {} section(s) for session {session_id} (learned={}, promoted={promoted})",
            reconciled.sections.len(),
            learned.is_some()
        );

        self.history.record(
            &user_id,
            &HistoryEvent::Confirm {
                session_id: session_id.to_string(),
                sections_count: reconciled.sections.len(),
                auto_learned_rule: learned.is_some(),
                rule_version: learned.map(|learned| learned.version),
                learn_method: learned.map(|learned| learned.method),
                index_base: reconciled.base,
                promoted,
            },
        );

        Ok(ConfirmReport {
            session_id: session_id.to_string(),
            sections: reconciled.sections,
            fingerprint,
            index_base: reconciled.base,
            learned,
            promoted,
        })
    }
}
