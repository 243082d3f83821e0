use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::entities::section::Section;
use crate::domain::entities::session::Session;
use crate::domain::fingerprint::grid_fingerprint;
use crate::domain::rule_applier::resolve_sections;
use crate::unix_now;
use crate::usecase::error::ServiceError;
use crate::usecase::ports::collaborators::GridSource;
use crate::usecase::ports::repo::SessionRepository;
use crate::usecase::services::learning_service::LearningService;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub session: Session,
    pub fingerprint: String,
    pub used_rule: bool,
    pub sections: Vec<Section>,
}

pub struct PreviewService {
    grids: Arc<dyn GridSource>,
    sessions: Arc<dyn SessionRepository>,
    learning: Arc<LearningService>,
}

impl PreviewService {
    pub fn new(
        grids: Arc<dyn GridSource>,
        sessions: Arc<dyn SessionRepository>,
        learning: Arc<LearningService>,
    ) -> Self {
        Self {
            grids,
            sessions,
            learning,
        }
    }

    /// Opens a session for an uploaded file with the best sections on offer:
    /// the remembered rule when it still fits, fresh detection otherwise.
    pub fn preview(
        &self,
        user_id: &str,
        file_path: &str,
        sheet_name: Option<&str>,
    ) -> Result<Preview, ServiceError> {
        let grid = self
            .grids
            .load_grid(file_path, sheet_name)
            .map_err(|err| ServiceError::Grid(format!("{file_path}: {err:#}")))?;
        if grid.is_empty() {
            return Err(ServiceError::EmptyGrid(file_path.to_string()));
        }

        let fingerprint = grid_fingerprint(&grid, sheet_name);
        let rule = match self.learning.lookup_rule(user_id, &fingerprint) {
            Ok(found) => found.map(|(_, rule)| rule),
            Err(err) => {
                warn!("rule lookup failed for {user_id}/{fingerprint}: {err}");
                None
            }
        };

        let resolved = resolve_sections(&grid, rule.as_ref());
        debug!(
            "preview {file_path}: {} section(s), used_rule={}",
            resolved.sections.len(),
            resolved.used_rule
        );

        let now = unix_now();
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            file_path: file_path.to_string(),
            sheet_name: sheet_name.map(str::to_string),
            auto_sections: resolved.sections.clone(),
            confirmed_sections: Vec::new(),
            used_rule: resolved.used_rule,
            fingerprint: fingerprint.clone(),
            confirming: false,
            created_at: now,
            updated_at: now,
        };
        self.sessions.save_session(&session)?;

        Ok(Preview {
            session,
            fingerprint,
            used_rule: resolved.used_rule,
            sections: resolved.sections,
        })
    }
}
