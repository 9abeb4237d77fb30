//! Library-level error taxonomy.
//!
//! `AppError` covers failures that abort processing of the affected scope
//! (a single trace, or the whole batch on initialisation failure). Per-row
//! sample problems are not errors here — they are recorded on the `Sample`
//! itself as a [`crate::data::sample::SampleErrorKind`], and a matcher
//! break restarts the HMM rather than raising anything.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("trace is empty after filtering")]
    EmptyTrace,

    #[error("degenerate geometry: {0}")]
    GeometryDegenerate(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
