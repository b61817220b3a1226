//! Builders for the push events published after commit.

use rendezvous_core::types::DbId;
use rendezvous_db::models::matches::Match;
use rendezvous_db::models::offer::Offer;
use rendezvous_events::{event_types, MeetupEvent};

use crate::Engine;

impl Engine {
    pub(crate) fn publish(&self, event: MeetupEvent) {
        tracing::debug!(event_type = %event.event_type, recipients = ?event.recipients, "Publishing event");
        self.events.publish(event);
    }

    pub(crate) fn notify_offer_received(&self, offer: &Offer) {
        self.publish(
            MeetupEvent::new(event_types::OFFER_RECEIVED)
                .with_offer(offer.id)
                .with_actor(offer.from_user_id)
                .to([offer.to_user_id])
                .with_payload(serde_json::json!({
                    "activity": offer.activity,
                    "sender_display_name": offer.sender_display_name,
                    "sender_photo_url": offer.sender_photo_url,
                    "expires_at": offer.expires_at,
                })),
        );
    }

    pub(crate) fn notify_offer_declined(&self, offer: &Offer) {
        self.publish(
            MeetupEvent::new(event_types::OFFER_DECLINED)
                .with_offer(offer.id)
                .with_actor(offer.to_user_id)
                .to([offer.from_user_id]),
        );
    }

    /// Publish a match event to both participants, or to everyone but the
    /// actor when one is given.
    pub(crate) fn notify_match(&self, event_type: &str, m: &Match, actor: Option<DbId>) {
        let recipients = [m.user_a, m.user_b]
            .into_iter()
            .filter(|u| Some(*u) != actor);
        let mut event = MeetupEvent::new(event_type)
            .with_match(m.id)
            .to(recipients)
            .with_payload(match_payload(m));
        if let Some(actor) = actor {
            event = event.with_actor(actor);
        }
        self.publish(event);
    }
}

fn match_payload(m: &Match) -> serde_json::Value {
    serde_json::json!({
        "status": m.status,
        "activity": m.activity,
        "confirmed_place": m.confirmed_place.as_deref(),
        "cancel_reason": m.cancel_reason,
        "outcome": m.outcome,
    })
}
