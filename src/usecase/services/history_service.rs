use std::sync::Arc;

use log::warn;

use crate::domain::entities::history::{HistoryEvent, HistoryRecord};
use crate::usecase::ports::repo::{HistoryRepository, RepoError};

/// Per-user log of chat edits and confirmations.
pub struct HistoryService {
    repo: Arc<dyn HistoryRepository>,
}

impl HistoryService {
    pub fn new(repo: Arc<dyn HistoryRepository>) -> Self {
        Self { repo }
    }

    /// Best-effort append; a failing store only costs the log line.
    pub fn record(&self, user_id: &str, event: &HistoryEvent) {
        if let Err(err) = self.repo.append_history(user_id, event) {
            warn!("failed to append history for {user_id}: {err}");
        }
    }

    pub fn history(&self, user_id: &str) -> Result<Vec<HistoryRecord>, RepoError> {
        self.repo.load_history(user_id)
    }

    pub fn reset(&self, user_id: &str) -> Result<(), RepoError> {
        self.repo.reset_history(user_id)
    }
}
