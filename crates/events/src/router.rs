//! Event-to-push routing.
//!
//! [`PushRouter`] subscribes to the event bus and hands every event to the
//! configured [`PushDispatcher`] once per recipient. Delivery is
//! fire-and-forget: failures are logged and never reach the engine.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::bus::MeetupEvent;
use crate::dispatcher::PushDispatcher;

pub struct PushRouter {
    dispatcher: Arc<dyn PushDispatcher>,
}

impl PushRouter {
    pub fn new(dispatcher: Arc<dyn PushDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Run the routing loop.
    ///
    /// The loop exits when the channel is closed (the [`EventBus`] is
    /// dropped).
    ///
    /// [`EventBus`]: crate::EventBus
    pub async fn run(self, mut receiver: broadcast::Receiver<MeetupEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.route_event(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Push router lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, push router shutting down");
                    break;
                }
            }
        }
    }

    async fn route_event(&self, event: &MeetupEvent) {
        for &user_id in &event.recipients {
            if let Err(e) = self.dispatcher.dispatch(user_id, event).await {
                tracing::error!(
                    user_id,
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to dispatch push notification"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rendezvous_core::types::DbId;

    use super::*;
    use crate::bus::{event_types, EventBus};
    use crate::dispatcher::DispatchError;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<(DbId, String)>>,
        fail_for: Option<DbId>,
    }

    #[async_trait]
    impl PushDispatcher for Recording {
        async fn dispatch(&self, user_id: DbId, event: &MeetupEvent) -> Result<(), DispatchError> {
            if self.fail_for == Some(user_id) {
                return Err(DispatchError::HttpStatus(503));
            }
            self.sent
                .lock()
                .unwrap()
                .push((user_id, event.event_type.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn routes_each_recipient_and_stops_on_close() {
        let recording = Arc::new(Recording::default());
        let bus = EventBus::default();
        let rx = bus.subscribe();
        let handle = tokio::spawn(PushRouter::new(recording.clone()).run(rx));

        bus.publish(MeetupEvent::new(event_types::MATCH_CREATED).to([1, 2]));
        bus.publish(MeetupEvent::new(event_types::OFFER_DECLINED).to([3]));
        drop(bus);
        handle.await.unwrap();

        let sent = recording.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                (1, "match.created".to_string()),
                (2, "match.created".to_string()),
                (3, "offer.declined".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn one_failed_recipient_does_not_block_others() {
        let recording = Arc::new(Recording {
            fail_for: Some(1),
            ..Default::default()
        });
        let bus = EventBus::default();
        let rx = bus.subscribe();
        let handle = tokio::spawn(PushRouter::new(recording.clone()).run(rx));

        bus.publish(MeetupEvent::new(event_types::MATCH_CANCELLED).to([1, 2]));
        drop(bus);
        handle.await.unwrap();

        let sent = recording.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![(2, "match.cancelled".to_string())]);
    }
}
