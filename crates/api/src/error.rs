use thiserror::Error;

/// The closed error surface every use case returns. Deliberately flat
/// -- callers (a thin HTTP layer, a CLI, a test) map each variant to
/// whatever transport-specific representation they need; this crate has
/// no opinion on status codes.
#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A retryable infrastructure failure (lock unavailable, DB timeout).
    #[error("temporarily unavailable: {0}")]
    Transient(String),

    /// A non-retryable infrastructure failure.
    #[error("internal error: {0}")]
    Fatal(String),
}

/// Infra-layer failures arrive as `anyhow::Error` (sqlx/redis errors already
/// flattened by the repo/lock/queue traits); they are not retryable from
/// here, so they always land as `Fatal`. A use case that can tell a
/// transient condition apart (e.g. slot lock unavailable) constructs
/// `Transient` directly instead of going through this conversion.
impl From<anyhow::Error> for SchedulingError {
    fn from(e: anyhow::Error) -> Self {
        SchedulingError::Fatal(e.to_string())
    }
}
