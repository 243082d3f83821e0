use std::path::PathBuf;

use crate::domain::entities::candidate::Candidate;
use crate::domain::entities::history::{HistoryEvent, HistoryRecord};
use crate::domain::entities::rule::Rule;
use crate::domain::entities::session::Session;
use crate::infra::sqlite::queries::{
    append_history, end_confirm, load_candidates, load_history, load_rule,
    load_session, reset_history, save_rule, save_session, sweep_expired_sessions,
    try_begin_confirm, update_ledger,
};
use crate::infra::sqlite::schema::init_db;
use crate::usecase::ports::repo::{
    HistoryRepository, LedgerState, RepoError, RuleKey, RuleRepository, SessionRepository,
};

/// Rules, candidates, sessions and history in one SQLite file.
pub struct SqliteRepo {
    pub db_path: PathBuf,
}

impl SqliteRepo {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

fn repo_err(err: anyhow::Error) -> RepoError {
    RepoError::Message(format!("{err:#}"))
}

impl RuleRepository for SqliteRepo {
    fn init(&self) -> Result<(), RepoError> {
        init_db(&self.db_path).map_err(repo_err)
    }

    fn load_rule(&self, key: &RuleKey) -> Result<Option<Rule>, RepoError> {
        load_rule(&self.db_path, &key.user_id, &key.fingerprint).map_err(repo_err)
    }

    fn save_rule(&self, key: &RuleKey, rule: &Rule) -> Result<(), RepoError> {
        save_rule(&self.db_path, &key.user_id, &key.fingerprint, rule).map_err(repo_err)
    }

    fn load_candidates(&self, key: &RuleKey) -> Result<Vec<Candidate>, RepoError> {
        load_candidates(&self.db_path, &key.user_id, &key.fingerprint).map_err(repo_err)
    }

    fn update_ledger(
        &self,
        key: &RuleKey,
        apply: &mut dyn FnMut(&mut LedgerState) -> bool,
    ) -> Result<bool, RepoError> {
        update_ledger(&self.db_path, &key.user_id, &key.fingerprint, apply).map_err(repo_err)
    }
}

impl SessionRepository for SqliteRepo {
    fn load_session(&self, session_id: &str) -> Result<Option<Session>, RepoError> {
        load_session(&self.db_path, session_id).map_err(repo_err)
    }

    fn save_session(&self, session: &Session) -> Result<(), RepoError> {
        save_session(&self.db_path, session).map_err(repo_err)
    }

    fn try_begin_confirm(&self, session_id: &str) -> Result<bool, RepoError> {
        try_begin_confirm(&self.db_path, session_id).map_err(repo_err)
    }

    fn end_confirm(&self, session_id: &str) -> Result<(), RepoError> {
        end_confirm(&self.db_path, session_id).map_err(repo_err)
    }

    fn sweep_expired(&self, cutoff: i64) -> Result<usize, RepoError> {
        sweep_expired_sessions(&self.db_path, cutoff).map_err(repo_err)
    }
}

impl HistoryRepository for SqliteRepo {
    fn append_history(&self, user_id: &str, event: &HistoryEvent) -> Result<(), RepoError> {
        append_history(&self.db_path, user_id, event).map_err(repo_err)
    }

    fn load_history(&self, user_id: &str) -> Result<Vec<HistoryRecord>, RepoError> {
        load_history(&self.db_path, user_id).map_err(repo_err)
    }

    fn reset_history(&self, user_id: &str) -> Result<(), RepoError> {
        reset_history(&self.db_path, user_id).map_err(repo_err)
    }
}
