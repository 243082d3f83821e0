//! Section-boundary detection for loosely structured spreadsheets, with a
//! per-user memory of confirmed layouts that keeps learning from edits.
//!
//! The flow is: load a grid, look up a remembered rule by the grid's
//! fingerprint (or detect from scratch), normalize and validate indices,
//! let a human edit and confirm, then remember the result. Edits made along
//! the way become candidates that are promoted into the rule once they have
//! been seen often enough.

pub mod config;

pub mod domain {
    pub mod detector;
    pub mod edit_applier;
    pub mod error;
    pub mod fingerprint;
    pub mod index;
    pub mod promotion;
    pub mod rule_applier;

    pub mod entities {
        pub mod candidate;
        pub mod edit;
        pub mod grid;
        pub mod history;
        pub mod rule;
        pub mod section;
        pub mod session;
    }
}

pub mod usecase {
    pub mod error;

    pub mod ports {
        pub mod collaborators;
        pub mod repo;
    }

    pub mod services {
        pub mod confirm_service;
        pub mod edit_service;
        pub mod history_service;
        pub mod learning_service;
        pub mod preview_service;
        pub mod session_service;
    }
}

pub mod infra {
    pub mod import {
        pub mod csv;
        pub mod loader;
        pub mod xlsx;
    }

    pub mod sqlite {
        pub mod queries;
        pub mod repo;
        pub mod schema;
    }
}

pub use domain::detector::detect_sections;
pub use domain::edit_applier::{apply_edit, EditOutcome};
pub use domain::error::SectionError;
pub use domain::fingerprint::{fingerprint, grid_fingerprint};
pub use domain::index::{normalize_index_base, reconcile_sections, validate_sections, IndexBase};
pub use domain::rule_applier::apply_rule;

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests;
