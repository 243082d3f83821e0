use crate::domain::entities::candidate::Candidate;
use crate::domain::entities::history::{HistoryEvent, HistoryRecord};
use crate::domain::entities::rule::Rule;
use crate::domain::entities::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    Message(String),
}

impl std::fmt::Display for RepoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoError::Message(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for RepoError {}

/// Exact-match key of a remembered rule and its candidate ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub user_id: String,
    pub fingerprint: String,
}

impl RuleKey {
    pub fn new(user_id: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

/// Rule and candidates of one key as seen inside a single transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerState {
    pub rule: Option<Rule>,
    pub candidates: Vec<Candidate>,
}

pub trait RuleRepository: Send + Sync {
    fn init(&self) -> Result<(), RepoError>;

    fn load_rule(&self, key: &RuleKey) -> Result<Option<Rule>, RepoError>;
    fn save_rule(&self, key: &RuleKey, rule: &Rule) -> Result<(), RepoError>;
    fn load_candidates(&self, key: &RuleKey) -> Result<Vec<Candidate>, RepoError>;

    /// Read-modify-write of the rule and ledger under one exclusive
    /// transaction. `apply` returns whether anything changed; both halves
    /// are written back only then. Returns what `apply` returned.
    fn update_ledger(
        &self,
        key: &RuleKey,
        apply: &mut dyn FnMut(&mut LedgerState) -> bool,
    ) -> Result<bool, RepoError>;
}

pub trait SessionRepository: Send + Sync {
    fn load_session(&self, session_id: &str) -> Result<Option<Session>, RepoError>;
    /// Upserts the session body. Never touches the confirm lock.
    fn save_session(&self, session: &Session) -> Result<(), RepoError>;

    /// Atomically sets the confirm lock. `false` means another confirm holds
    /// it (or the session does not exist).
    fn try_begin_confirm(&self, session_id: &str) -> Result<bool, RepoError>;
    fn end_confirm(&self, session_id: &str) -> Result<(), RepoError>;

    /// Deletes sessions last updated before `cutoff` (Unix seconds).
    fn sweep_expired(&self, cutoff: i64) -> Result<usize, RepoError>;
}

pub trait HistoryRepository: Send + Sync {
    fn append_history(&self, user_id: &str, event: &HistoryEvent) -> Result<(), RepoError>;
    fn load_history(&self, user_id: &str) -> Result<Vec<HistoryRecord>, RepoError>;
    fn reset_history(&self, user_id: &str) -> Result<(), RepoError>;
}
