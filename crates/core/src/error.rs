use crate::types::DbId;

/// Domain error taxonomy shared by the engine, the API, and the worker.
///
/// Each variant maps to exactly one caller-visible error class; the API layer
/// translates them into HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// The request is well-formed but the current state does not allow it
    /// (wrong status, expired, already matched, blocked, activity mismatch).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// A rate limit, slot cap, or cooldown was hit.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A duplicate request is already in flight.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
