//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`MeetupEvent`]s. It is
//! shared via `Arc<EventBus>` between the engine and the push router.

use chrono::{DateTime, Utc};
use rendezvous_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event type names.
pub mod event_types {
    pub const OFFER_RECEIVED: &str = "offer.received";
    pub const OFFER_DECLINED: &str = "offer.declined";
    pub const MATCH_CREATED: &str = "match.created";
    pub const MATCH_PLACE_CONFIRMED: &str = "match.place_confirmed";
    pub const MATCH_CANCELLED: &str = "match.cancelled";
    pub const MATCH_COMPLETED: &str = "match.completed";
    pub const MATCH_CONFIRMATION_REQUESTED: &str = "match.confirmation_requested";
    pub const MATCH_RESOLVED: &str = "match.resolved";
}

// ---------------------------------------------------------------------------
// MeetupEvent
// ---------------------------------------------------------------------------

/// A domain event that should reach one or more users' devices.
///
/// Constructed via [`MeetupEvent::new`] and enriched with the builder
/// methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetupEvent {
    /// Dot-separated event name, e.g. `"match.created"`.
    pub event_type: String,

    pub offer_id: Option<DbId>,

    pub match_id: Option<DbId>,

    /// The user whose action caused the event, if any.
    pub actor_user_id: Option<DbId>,

    /// Users to notify.
    pub recipients: Vec<DbId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl MeetupEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            offer_id: None,
            match_id: None,
            actor_user_id: None,
            recipients: Vec::new(),
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_offer(mut self, offer_id: DbId) -> Self {
        self.offer_id = Some(offer_id);
        self
    }

    pub fn with_match(mut self, match_id: DbId) -> Self {
        self.match_id = Some(match_id);
        self
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    /// Set the users to notify.
    pub fn to(mut self, recipients: impl IntoIterator<Item = DbId>) -> Self {
        self.recipients = recipients.into_iter().collect();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<MeetupEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: MeetupEvent) {
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MeetupEvent> {
        self.sender.subscribe()
    }

    /// Number of live receivers, i.e. attached push routers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
