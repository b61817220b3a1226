use rendezvous_core::error::CoreError;

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// SQLSTATE codes worth retrying the whole transaction for:
/// serialization failure, deadlock, and unique-key race.
const RETRYABLE_SQLSTATES: [&str; 3] = ["40001", "40P01", "23505"];

impl EngineError {
    /// Whether the failed transaction can be retried from the top.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Database(sqlx::Error::Database(db)) => db
                .code()
                .as_deref()
                .is_some_and(|code| RETRYABLE_SQLSTATES.contains(&code)),
            _ => false,
        }
    }

    /// The domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            EngineError::Core(e) => Some(e),
            EngineError::Database(_) => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_are_not_retried() {
        let err = EngineError::from(CoreError::FailedPrecondition("nope".into()));
        assert!(!err.is_retryable());
        assert!(err.as_core().is_some());
        assert_eq!(err.to_string(), "Failed precondition: nope");
    }

    #[test]
    fn non_database_sqlx_errors_are_not_retried() {
        let err = EngineError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_retryable());
        assert!(err.as_core().is_none());
    }
}
