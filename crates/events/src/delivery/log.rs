use async_trait::async_trait;
use rendezvous_core::types::DbId;

use crate::bus::MeetupEvent;
use crate::dispatcher::{DispatchError, PushDispatcher};

/// Dispatcher used when no push endpoint is configured: records each
/// notification in the log and reports success.
#[derive(Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl PushDispatcher for LogDispatcher {
    async fn dispatch(&self, user_id: DbId, event: &MeetupEvent) -> Result<(), DispatchError> {
        tracing::info!(
            user_id,
            event_type = %event.event_type,
            match_id = ?event.match_id,
            offer_id = ?event.offer_id,
            "Push notification (log only)"
        );
        Ok(())
    }
}
