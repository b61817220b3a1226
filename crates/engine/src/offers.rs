//! Offer protocol: directed invitations between two present users.

use chrono::Utc;
use rendezvous_core::error::CoreError;
use rendezvous_core::offer::{
    offer_expiry, outgoing_cap_reached, validate_target, OfferResponse, OfferStatus,
};
use rendezvous_core::presence::activities_compatible;
use rendezvous_core::types::{DbId, Timestamp};
use rendezvous_db::models::offer::{NewOffer, Offer};
use rendezvous_db::models::presence::PresenceSession;
use rendezvous_db::repositories::{
    BlockRepo, CooldownRepo, MatchRepo, OfferRepo, PresenceRepo, ProfileRepo,
};
use rendezvous_events::event_types;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use crate::error::EngineResult;
use crate::idempotency::operations;
use crate::match_guard::linked_active_match;
use crate::places::find_candidates;
use crate::Engine;

/// Minimal result of [`Engine::create_offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferCreated {
    pub offer_id: DbId,
    /// Set when a pending reverse offer turned this into a match.
    pub match_id: Option<DbId>,
}

/// How a response ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOutcome {
    Accepted,
    Declined,
    /// The sender was matched elsewhere first; the offer was expired.
    TooLate,
}

/// Minimal result of [`Engine::respond_to_offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferResponded {
    pub offer_id: DbId,
    pub outcome: ResponseOutcome,
    pub match_id: Option<DbId>,
}

/// Minimal result of [`Engine::cancel_offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferCancelled {
    pub offer_id: DbId,
}

fn live(session: Option<PresenceSession>, now: Timestamp) -> Option<PresenceSession> {
    session.filter(|p| p.is_live(now))
}

/// Flip a pending offer to a terminal status and drop it from the sender's
/// outstanding set. Returns `None` if it was no longer pending.
pub(crate) async fn close_offer_in_tx(
    conn: &mut PgConnection,
    offer: &Offer,
    status: OfferStatus,
    match_id: Option<DbId>,
    now: Timestamp,
) -> EngineResult<Option<Offer>> {
    let closed = OfferRepo::finish(&mut *conn, offer.id, status, match_id, now).await?;
    if closed.is_some() {
        PresenceRepo::remove_outgoing_offer(&mut *conn, offer.from_user_id, offer.id).await?;
    }
    Ok(closed)
}

impl Engine {
    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Send an offer from `from_user_id` to `to_user_id`.
    ///
    /// An already-pending offer in the same direction is returned as-is. A
    /// pending offer in the reverse direction is accepted on the spot.
    pub async fn create_offer(
        &self,
        from_user_id: DbId,
        to_user_id: DbId,
        request_id: Option<&str>,
    ) -> EngineResult<OfferCreated> {
        validate_target(from_user_id, to_user_id).map_err(CoreError::Validation)?;

        self.with_lock(from_user_id, operations::OFFER_CREATE, request_id, || async move {
            let (result, created) = self
                .with_serializable_retry("offer.create", || {
                    self.create_offer_attempt(from_user_id, to_user_id)
                })
                .await?;
            if let (true, Some(match_id)) = (created, result.match_id) {
                self.after_match_created(match_id).await;
            }
            Ok(result)
        })
        .await
    }

    async fn create_offer_attempt(
        &self,
        from_user_id: DbId,
        to_user_id: DbId,
    ) -> EngineResult<(OfferCreated, bool)> {
        let now = Utc::now();
        let mut tx = self.begin().await?;

        if BlockRepo::is_blocked_either(&mut *tx, from_user_id, to_user_id).await? {
            return Err(CoreError::FailedPrecondition(
                "You cannot send an offer to this user".to_string(),
            )
            .into());
        }

        let sender = live(PresenceRepo::find(&mut *tx, from_user_id).await?, now).ok_or_else(
            || CoreError::FailedPrecondition("Start a presence before sending offers".to_string()),
        )?;
        if linked_active_match(&mut *tx, &sender).await?.is_some() {
            return Err(CoreError::FailedPrecondition("You are already matched".to_string()).into());
        }

        if let Some(existing) =
            OfferRepo::find_pending_between(&mut *tx, from_user_id, to_user_id).await?
        {
            if !existing.is_lapsed(now) {
                tx.commit().await?;
                return Ok((
                    OfferCreated {
                        offer_id: existing.id,
                        match_id: None,
                    },
                    false,
                ));
            }
            close_offer_in_tx(&mut *tx, &existing, OfferStatus::Expired, None, now).await?;
        }

        let recipient = live(PresenceRepo::find(&mut *tx, to_user_id).await?, now)
            .ok_or_else(|| CoreError::FailedPrecondition("Recipient is not present".to_string()))?;
        if MatchRepo::find_active_for_user(&mut *tx, to_user_id)
            .await?
            .is_some()
        {
            return Err(
                CoreError::FailedPrecondition("Recipient is already matched".to_string()).into(),
            );
        }
        if MatchRepo::find_active_for_user(&mut *tx, from_user_id)
            .await?
            .is_some()
        {
            return Err(CoreError::FailedPrecondition("You are already matched".to_string()).into());
        }
        if CooldownRepo::is_active(&mut *tx, from_user_id, to_user_id, now).await? {
            return Err(CoreError::FailedPrecondition(
                "This pair recently declined; try again later".to_string(),
            )
            .into());
        }
        if !activities_compatible(&sender.activity, &recipient.activity) {
            return Err(CoreError::FailedPrecondition(format!(
                "Recipient is present for '{}', not '{}'",
                recipient.activity, sender.activity
            ))
            .into());
        }

        let center = sender.location().midpoint(&recipient.location());
        let query = self.availability_query(center, &sender.activity);
        if find_candidates(&mut *tx, &query, now).await?.is_empty() {
            return Err(CoreError::FailedPrecondition(
                "No meeting place is available near both of you".to_string(),
            )
            .into());
        }

        if let Some(reverse) =
            OfferRepo::find_pending_between(&mut *tx, to_user_id, from_user_id).await?
        {
            if !reverse.is_lapsed(now) && activities_compatible(&reverse.activity, &sender.activity)
            {
                let creation = self
                    .create_match_in_tx(&mut *tx, to_user_id, from_user_id, &reverse.activity, now)
                    .await?;
                close_offer_in_tx(
                    &mut *tx,
                    &reverse,
                    OfferStatus::Accepted,
                    Some(creation.match_id),
                    now,
                )
                .await?;
                tx.commit().await?;

                tracing::info!(
                    offer_id = reverse.id,
                    match_id = creation.match_id,
                    from_user_id,
                    to_user_id,
                    "Mutual offers matched"
                );
                return Ok((
                    OfferCreated {
                        offer_id: reverse.id,
                        match_id: Some(creation.match_id),
                    },
                    creation.created,
                ));
            }
        }

        if outgoing_cap_reached(
            sender.outgoing_offer_ids.len(),
            self.config.max_outgoing_offers,
        ) {
            return Err(CoreError::ResourceExhausted(format!(
                "At most {} offers may be pending at once",
                self.config.max_outgoing_offers
            ))
            .into());
        }
        if sender.in_cooldown(now) {
            return Err(CoreError::ResourceExhausted(
                "Please wait before sending another offer".to_string(),
            )
            .into());
        }

        let profile = ProfileRepo::find(&mut *tx, from_user_id).await?;
        let offer = OfferRepo::create(
            &mut *tx,
            &NewOffer {
                from_user_id,
                to_user_id,
                activity: sender.activity.clone(),
                expires_at: offer_expiry(
                    now,
                    self.config.offer_ttl,
                    sender.expires_at,
                    recipient.expires_at,
                ),
                sender_display_name: profile.as_ref().map(|p| p.display_name.clone()),
                sender_photo_url: profile.and_then(|p| p.photo_url),
            },
        )
        .await?;
        PresenceRepo::add_outgoing_offer(
            &mut *tx,
            from_user_id,
            offer.id,
            now + self.config.offer_cooldown,
        )
        .await?;
        PresenceRepo::increment_exposure(&mut *tx, to_user_id).await?;
        tx.commit().await?;

        tracing::info!(offer_id = offer.id, from_user_id, to_user_id, "Offer created");
        self.notify_offer_received(&offer);
        Ok((
            OfferCreated {
                offer_id: offer.id,
                match_id: None,
            },
            false,
        ))
    }

    // -----------------------------------------------------------------------
    // Respond
    // -----------------------------------------------------------------------

    /// Accept or decline an offer addressed to the caller.
    pub async fn respond_to_offer(
        &self,
        user_id: DbId,
        offer_id: DbId,
        response: OfferResponse,
        request_id: Option<&str>,
    ) -> EngineResult<OfferResponded> {
        self.with_lock(user_id, operations::OFFER_RESPOND, request_id, || async move {
            let (result, created) = self
                .with_serializable_retry("offer.respond", || {
                    self.respond_attempt(user_id, offer_id, response)
                })
                .await?;
            if let (true, Some(match_id)) = (created, result.match_id) {
                self.after_match_created(match_id).await;
            }
            Ok(result)
        })
        .await
    }

    async fn respond_attempt(
        &self,
        user_id: DbId,
        offer_id: DbId,
        response: OfferResponse,
    ) -> EngineResult<(OfferResponded, bool)> {
        let now = Utc::now();
        let mut tx = self.begin().await?;

        let offer = OfferRepo::find_by_id(&mut *tx, offer_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "offer",
                id: offer_id,
            })?;
        if offer.to_user_id != user_id {
            return Err(
                CoreError::Forbidden("Only the recipient can respond to an offer".to_string())
                    .into(),
            );
        }
        if !offer.is_pending() {
            return Err(
                CoreError::FailedPrecondition(format!("Offer is already {}", offer.status)).into(),
            );
        }
        if offer.is_lapsed(now) {
            close_offer_in_tx(&mut *tx, &offer, OfferStatus::Expired, None, now).await?;
            tx.commit().await?;
            return Err(CoreError::FailedPrecondition("Offer has expired".to_string()).into());
        }

        match response {
            OfferResponse::Decline => {
                close_offer_in_tx(&mut *tx, &offer, OfferStatus::Declined, None, now).await?;
                CooldownRepo::set_pair(
                    &mut *tx,
                    offer.from_user_id,
                    offer.to_user_id,
                    now + self.config.rejection_cooldown,
                )
                .await?;
                tx.commit().await?;

                tracing::info!(offer_id, user_id, "Offer declined");
                self.notify_offer_declined(&offer);
                Ok((
                    OfferResponded {
                        offer_id,
                        outcome: ResponseOutcome::Declined,
                        match_id: None,
                    },
                    false,
                ))
            }
            OfferResponse::Accept => self.accept_in_tx(tx, offer, now).await,
        }
    }

    async fn accept_in_tx(
        &self,
        mut tx: sqlx::Transaction<'static, sqlx::Postgres>,
        offer: Offer,
        now: Timestamp,
    ) -> EngineResult<(OfferResponded, bool)> {
        let too_late = OfferResponded {
            offer_id: offer.id,
            outcome: ResponseOutcome::TooLate,
            match_id: None,
        };

        let recipient = live(PresenceRepo::find(&mut *tx, offer.to_user_id).await?, now)
            .ok_or_else(|| {
                CoreError::FailedPrecondition("Your presence has expired".to_string())
            })?;
        if linked_active_match(&mut *tx, &recipient).await?.is_some() {
            return Err(
                CoreError::FailedPrecondition("You are already matched".to_string()).into(),
            );
        }

        let sender = live(PresenceRepo::find(&mut *tx, offer.from_user_id).await?, now);
        let sender_free = match &sender {
            Some(session) => linked_active_match(&mut *tx, session).await?.is_none(),
            None => false,
        };
        let Some(sender) = sender.filter(|_| sender_free) else {
            close_offer_in_tx(&mut *tx, &offer, OfferStatus::Expired, None, now).await?;
            tx.commit().await?;
            tracing::info!(offer_id = offer.id, "Offer accepted too late");
            return Ok((too_late, false));
        };
        if !activities_compatible(&sender.activity, &recipient.activity) {
            return Err(CoreError::FailedPrecondition(
                "You are no longer present for the same activity".to_string(),
            )
            .into());
        }

        let creation = self
            .create_match_in_tx(&mut *tx, offer.from_user_id, offer.to_user_id, &offer.activity, now)
            .await?;
        close_offer_in_tx(
            &mut *tx,
            &offer,
            OfferStatus::Accepted,
            Some(creation.match_id),
            now,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(offer_id = offer.id, match_id = creation.match_id, "Offer accepted");
        Ok((
            OfferResponded {
                offer_id: offer.id,
                outcome: ResponseOutcome::Accepted,
                match_id: Some(creation.match_id),
            },
            creation.created,
        ))
    }

    /// Best-effort follow-up once a match exists: withdraw every other pending
    /// offer either participant is party to, then notify both.
    pub(crate) async fn after_match_created(&self, match_id: DbId) {
        let m = match MatchRepo::find_by_id(&self.pool, match_id).await {
            Ok(Some(m)) => m,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(match_id, error = %e, "Failed to load new match");
                return;
            }
        };

        for user_id in [m.user_a, m.user_b] {
            let pending = match OfferRepo::list_pending_involving(&self.pool, user_id).await {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::warn!(match_id, user_id, error = %e, "Failed to list offers to withdraw");
                    continue;
                }
            };
            for offer in pending {
                let result = self
                    .with_serializable_retry("offer.withdraw", || {
                        self.close_offer_attempt(offer.id, OfferStatus::Cancelled)
                    })
                    .await;
                if let Err(e) = result {
                    tracing::warn!(match_id, offer_id = offer.id, error = %e, "Failed to withdraw offer");
                }
            }
        }

        self.notify_match(event_types::MATCH_CREATED, &m, None);
    }

    /// Close one offer in its own transaction if it is still pending.
    pub(crate) async fn close_offer_attempt(
        &self,
        offer_id: DbId,
        status: OfferStatus,
    ) -> EngineResult<bool> {
        let now = Utc::now();
        let mut tx = self.begin().await?;
        let Some(offer) = OfferRepo::find_by_id(&mut *tx, offer_id).await? else {
            return Ok(false);
        };
        if !offer.is_pending() {
            return Ok(false);
        }
        let closed = close_offer_in_tx(&mut *tx, &offer, status, None, now)
            .await?
            .is_some();
        tx.commit().await?;
        Ok(closed)
    }

    // -----------------------------------------------------------------------
    // Cancel and list
    // -----------------------------------------------------------------------

    /// Withdraw a pending offer the caller sent. The sender cooldown stays.
    pub async fn cancel_offer(
        &self,
        user_id: DbId,
        offer_id: DbId,
        request_id: Option<&str>,
    ) -> EngineResult<OfferCancelled> {
        self.with_lock(user_id, operations::OFFER_CANCEL, request_id, || {
            self.with_serializable_retry("offer.cancel", || {
                self.cancel_offer_attempt(user_id, offer_id)
            })
        })
        .await
    }

    async fn cancel_offer_attempt(
        &self,
        user_id: DbId,
        offer_id: DbId,
    ) -> EngineResult<OfferCancelled> {
        let now = Utc::now();
        let mut tx = self.begin().await?;

        let offer = OfferRepo::find_by_id(&mut *tx, offer_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "offer",
                id: offer_id,
            })?;
        if offer.from_user_id != user_id {
            return Err(
                CoreError::Forbidden("Only the sender can cancel an offer".to_string()).into(),
            );
        }
        if !offer.is_pending() {
            return Err(
                CoreError::FailedPrecondition(format!("Offer is already {}", offer.status)).into(),
            );
        }

        close_offer_in_tx(&mut *tx, &offer, OfferStatus::Cancelled, None, now).await?;
        tx.commit().await?;

        tracing::info!(offer_id, user_id, "Offer cancelled");
        Ok(OfferCancelled { offer_id })
    }

    /// Pending, unexpired offers addressed to the caller, newest first.
    pub async fn list_inbox(&self, user_id: DbId) -> EngineResult<Vec<Offer>> {
        Ok(OfferRepo::list_inbox(&self.pool, user_id, Utc::now()).await?)
    }

    /// Pending, unexpired offers the caller sent, newest first.
    pub async fn list_outgoing(&self, user_id: DbId) -> EngineResult<Vec<Offer>> {
        Ok(OfferRepo::list_outgoing(&self.pool, user_id, Utc::now()).await?)
    }

    pub async fn get_offer(&self, user_id: DbId, offer_id: DbId) -> EngineResult<Offer> {
        let offer = OfferRepo::find_by_id(&self.pool, offer_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "offer",
                id: offer_id,
            })?;
        if offer.from_user_id != user_id && offer.to_user_id != user_id {
            return Err(CoreError::Forbidden("This offer is not yours".to_string()).into());
        }
        Ok(offer)
    }
}
