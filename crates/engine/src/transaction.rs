//! Serializable transactions with bounded retry.
//!
//! Every state-changing operation runs as a closure that opens its own
//! transaction. On a serialization failure, deadlock, or unique-key race the
//! whole closure is re-run against fresh reads.

use std::future::Future;

use sqlx::{Postgres, Transaction};

use crate::error::EngineResult;
use crate::Engine;

/// Base delay between attempts; multiplied by the attempt number.
const RETRY_BACKOFF_MS: u64 = 15;

impl Engine {
    /// Open a transaction at SERIALIZABLE isolation.
    pub(crate) async fn begin(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent.
    pub(crate) async fn with_serializable_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let max_attempts = self.config.max_tx_attempts.max(1);
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Err(e) if e.is_retryable() && tries < max_attempts => {
                    tracing::debug!(operation, attempt = tries, error = %e, "Retrying transaction");
                    tokio::time::sleep(std::time::Duration::from_millis(
                        RETRY_BACKOFF_MS * u64::from(tries),
                    ))
                    .await;
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(operation, attempts = tries, error = %e, "Transaction retries exhausted");
                    return Err(e);
                }
                other => return other,
            }
        }
    }
}
