//! Error types crossing component boundaries.

use thiserror::Error;

/// Errors that can cross the boundary of a component (§7 of the design doc).
///
/// `NotFound` and `CacheDisabled` are ordinary control-flow outcomes, not
/// logged as errors; every other variant is logged at the point it is
/// raised before propagating.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache is disabled")]
    CacheDisabled,

    #[error("not found")]
    NotFound,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
