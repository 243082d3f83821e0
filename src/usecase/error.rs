use thiserror::Error;

use crate::domain::error::SectionError;
use crate::usecase::ports::repo::RepoError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("confirm already running for session {0}, try again later")]
    ConfirmInProgress(String),

    #[error("failed to load grid: {0}")]
    Grid(String),

    #[error("file or sheet is empty: {0}")]
    EmptyGrid(String),

    #[error("no sections supplied and the session has no detected sections")]
    MissingSections,

    #[error("section index {0} out of range")]
    NoSuchSection(usize),

    #[error("{}: {0}", .0.code())]
    Sections(#[from] SectionError),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            ServiceError::ConfirmInProgress(_) => "CONFIRM_IN_PROGRESS",
            ServiceError::Grid(_) => "GRID_UNREADABLE",
            ServiceError::EmptyGrid(_) => "GRID_EMPTY",
            ServiceError::MissingSections => "SECTIONS_MISSING",
            ServiceError::NoSuchSection(_) => "SECTION_NOT_FOUND",
            ServiceError::Sections(err) => err.code(),
            ServiceError::Repo(_) => "STORE_ERROR",
        }
    }
}
