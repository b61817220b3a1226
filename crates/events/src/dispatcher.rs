//! The seam between the engine's events and the external push provider.

use async_trait::async_trait;
use rendezvous_core::types::DbId;

use crate::bus::MeetupEvent;

/// Error type for push dispatch failures.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Push endpoint returned HTTP {0}")]
    HttpStatus(u16),
}

/// Delivers one event to one user's devices.
#[async_trait]
pub trait PushDispatcher: Send + Sync {
    async fn dispatch(&self, user_id: DbId, event: &MeetupEvent) -> Result<(), DispatchError>;
}
