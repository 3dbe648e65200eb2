//! Error types surfaced by the analytics core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required identifier was missing; nothing was persisted.
    #[error("missing required field: {0}")]
    Validation(&'static str),

    #[error("storage failure: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
}
