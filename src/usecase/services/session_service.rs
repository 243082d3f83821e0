use std::sync::Arc;

use log::info;

use crate::domain::entities::section::{to_drafts, Section, SectionDraft};
use crate::domain::entities::session::Session;
use crate::domain::index::validate_sections_unbounded;
use crate::unix_now;
use crate::usecase::error::ServiceError;
use crate::usecase::ports::repo::SessionRepository;

/// Direct section maintenance on a session, outside the chat flow. The grid
/// is not reloaded here, so only ordering is checked; the confirm step
/// applies the full range check.
pub struct SessionSectionsService {
    sessions: Arc<dyn SessionRepository>,
}

impl SessionSectionsService {
    pub fn new(sessions: Arc<dyn SessionRepository>) -> Self {
        Self { sessions }
    }

    pub fn working_sections(&self, session_id: &str) -> Result<Vec<Section>, ServiceError> {
        Ok(self.load(session_id)?.working_sections().to_vec())
    }

    pub fn replace_sections(
        &self,
        session_id: &str,
        drafts: &[SectionDraft],
    ) -> Result<Vec<Section>, ServiceError> {
        let mut session = self.load(session_id)?;
        let sections = validate_sections_unbounded(drafts)?;
        self.store(&mut session, sections)
    }

    pub fn add_section(
        &self,
        session_id: &str,
        draft: SectionDraft,
    ) -> Result<Vec<Section>, ServiceError> {
        let mut session = self.load(session_id)?;
        let mut drafts = to_drafts(session.working_sections());
        drafts.push(draft);
        let sections = validate_sections_unbounded(&drafts)?;
        self.store(&mut session, sections)
    }

    /// Removes the section at 0-based `index`. Removing the last one leaves
    /// the session without sections.
    pub fn delete_section(
        &self,
        session_id: &str,
        index: usize,
    ) -> Result<Vec<Section>, ServiceError> {
        let mut session = self.load(session_id)?;
        let mut sections = session.working_sections().to_vec();
        if index >= sections.len() {
            return Err(ServiceError::NoSuchSection(index));
        }
        sections.remove(index);
        self.store(&mut session, sections)
    }

    /// Drops sessions idle for longer than `ttl_hours`.
    pub fn sweep_expired(&self, ttl_hours: u64) -> Result<usize, ServiceError> {
        let ttl_secs = i64::try_from(ttl_hours.saturating_mul(3600)).unwrap_or(i64::MAX);
        let cutoff = unix_now().saturating_sub(ttl_secs);
        let removed = self.sessions.sweep_expired(cutoff)?;
        if removed > 0 {
            info!("swept {removed} expired session(s)");
        }
        Ok(removed)
    }

    fn load(&self, session_id: &str) -> Result<Session, ServiceError> {
        self.sessions
            .load_session(session_id)?
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))
    }

    /// Writes to whichever list is currently the working one.
    fn store(
        &self,
        session: &mut Session,
        sections: Vec<Section>,
    ) -> Result<Vec<Section>, ServiceError> {
        if session.confirmed_sections.is_empty() {
            session.auto_sections = sections.clone();
        } else {
            session.confirmed_sections = sections.clone();
        }
        session.updated_at = unix_now();
        self.sessions.save_session(session)?;
        Ok(sections)
    }
}
