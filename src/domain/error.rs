use thiserror::Error;

/// Why a section list cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SectionError {
    #[error("no sections to process")]
    SectionsEmpty,

    #[error("header_row={header_row}, start_row={start_row}, end_row={end_row}, nrows={nrows}")]
    IndexOutOfRange {
        header_row: i64,
        start_row: i64,
        end_row: i64,
        nrows: usize,
    },

    #[error("header_row={header_row}, start_row={start_row}, end_row={end_row} are not ordered")]
    Unordered {
        header_row: i64,
        start_row: i64,
        end_row: i64,
    },
}

impl SectionError {
    /// Stable machine-readable code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            SectionError::SectionsEmpty => "SECTIONS_EMPTY",
            SectionError::IndexOutOfRange { .. } | SectionError::Unordered { .. } => {
                "INDEX_OUT_OF_RANGE"
            }
        }
    }
}
