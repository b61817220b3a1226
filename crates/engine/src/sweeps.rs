//! Periodic reconciliation passes run by the worker.
//!
//! Each sweep selects a bounded batch, then handles every item in its own
//! serializable transaction that re-reads the row and re-checks the
//! condition. A failing item is logged and left for the next run.

use std::fmt::Debug;
use std::future::Future;

use rendezvous_core::confirmation::with_defaults;
use rendezvous_core::matching::{CancelReason, MatchStatus};
use rendezvous_core::offer::OfferStatus;
use rendezvous_core::presence::PresenceStatus;
use rendezvous_core::types::{DbId, Timestamp};
use rendezvous_db::models::matches::{Match, Side};
use rendezvous_db::repositories::{
    CooldownRepo, IdempotencyRepo, MatchRepo, OfferRepo, PairGuardRepo, PresenceRepo,
    PresenceStartRepo,
};
use rendezvous_events::event_types;

use crate::error::EngineResult;
use crate::matches::restore_presences_in_tx;
use crate::offers::close_offer_in_tx;
use crate::Engine;

/// Counts from one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Items changed (or rows purged).
    pub processed: usize,
    /// Items that no longer qualified when re-read.
    pub skipped: usize,
    pub failed: usize,
}

/// What a lapsed presence did to its match.
enum LapseEffect {
    None,
    Cancelled(Match),
    ConfirmationRequested(Match),
}

impl Engine {
    async fn sweep_each<I, F, Fut>(&self, sweep: &'static str, items: Vec<I>, mut handle: F) -> SweepReport
    where
        I: Copy + Debug,
        F: FnMut(I) -> Fut,
        Fut: Future<Output = EngineResult<bool>>,
    {
        let mut report = SweepReport::default();
        for item in items {
            match self.with_serializable_retry(sweep, || handle(item)).await {
                Ok(true) => report.processed += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(sweep, item = ?item, error = %e, "Sweep item failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    // -----------------------------------------------------------------------
    // Offers
    // -----------------------------------------------------------------------

    /// Expire pending offers past their expiry.
    pub async fn sweep_expired_offers(&self, now: Timestamp) -> EngineResult<SweepReport> {
        let ids: Vec<DbId> =
            OfferRepo::list_expired_pending(&self.pool, now, self.config.sweep_batch_size)
                .await?
                .into_iter()
                .map(|o| o.id)
                .collect();
        Ok(self
            .sweep_each("offer_expiry", ids, |id| self.expire_offer_attempt(id, now))
            .await)
    }

    async fn expire_offer_attempt(&self, offer_id: DbId, now: Timestamp) -> EngineResult<bool> {
        let mut tx = self.begin().await?;
        let Some(offer) = OfferRepo::find_by_id(&mut *tx, offer_id).await? else {
            return Ok(false);
        };
        if !offer.is_lapsed(now) {
            return Ok(false);
        }
        let expired = close_offer_in_tx(&mut *tx, &offer, OfferStatus::Expired, None, now)
            .await?
            .is_some();
        tx.commit().await?;
        if expired {
            tracing::debug!(offer_id, "Offer expired");
        }
        Ok(expired)
    }

    // -----------------------------------------------------------------------
    // Presence
    // -----------------------------------------------------------------------

    /// Remove lapsed presences, first reconciling any match they back.
    pub async fn sweep_expired_presences(&self, now: Timestamp) -> EngineResult<SweepReport> {
        let users: Vec<DbId> =
            PresenceRepo::list_expired(&self.pool, now, self.config.sweep_batch_size)
                .await?
                .into_iter()
                .map(|p| p.user_id)
                .collect();
        Ok(self
            .sweep_each("presence_expiry", users, |user_id| {
                self.expire_presence_attempt(user_id, now)
            })
            .await)
    }

    async fn expire_presence_attempt(&self, user_id: DbId, now: Timestamp) -> EngineResult<bool> {
        let mut tx = self.begin().await?;
        let Some(session) = PresenceRepo::find(&mut *tx, user_id).await? else {
            return Ok(false);
        };
        if session.is_live(now) {
            return Ok(false);
        }

        let mut effect = LapseEffect::None;
        if let (PresenceStatus::Matched, Some(match_id)) = (session.status, session.match_id) {
            if let Some(m) = MatchRepo::find_by_id(&mut *tx, match_id).await? {
                if matches!(m.status, MatchStatus::Pending | MatchStatus::LocationDeciding) {
                    let cancelled = self
                        .cancel_in_tx(&mut *tx, &m, None, CancelReason::PresenceExpired, now)
                        .await?;
                    effect = LapseEffect::Cancelled(cancelled);
                } else if m.status.lapses_into_confirmation() {
                    let pending = self.begin_confirmation_in_tx(&mut *tx, &m, now).await?;
                    restore_presences_in_tx(&mut *tx, &pending, now).await?;
                    effect = LapseEffect::ConfirmationRequested(pending);
                }
            }
        }

        PresenceRepo::delete(&mut *tx, user_id).await?;
        tx.commit().await?;
        tracing::info!(user_id, "Lapsed presence removed");

        match effect {
            LapseEffect::None => {}
            LapseEffect::Cancelled(m) => {
                self.after_match_closed(&m, event_types::MATCH_CANCELLED, None)
                    .await;
            }
            LapseEffect::ConfirmationRequested(m) => {
                self.notify_match(event_types::MATCH_CONFIRMATION_REQUESTED, &m, None);
            }
        }
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Matches
    // -----------------------------------------------------------------------

    /// Cancel matches that never left `pending`.
    pub async fn sweep_stale_pending_matches(&self, now: Timestamp) -> EngineResult<SweepReport> {
        let cutoff = now - self.config.pending_match_timeout;
        let ids = match_ids(
            MatchRepo::list_stale_pending(&self.pool, cutoff, self.config.sweep_batch_size).await?,
        );
        Ok(self
            .sweep_each("stale_pending_match", ids, |id| {
                self.cancel_stale_attempt(id, cutoff, now)
            })
            .await)
    }

    async fn cancel_stale_attempt(
        &self,
        match_id: DbId,
        cutoff: Timestamp,
        now: Timestamp,
    ) -> EngineResult<bool> {
        let mut tx = self.begin().await?;
        let Some(m) = MatchRepo::find_by_id(&mut *tx, match_id).await? else {
            return Ok(false);
        };
        if m.status != MatchStatus::Pending || m.created_at > cutoff {
            return Ok(false);
        }
        let cancelled = self
            .cancel_in_tx(&mut *tx, &m, None, CancelReason::Timeout, now)
            .await?;
        tx.commit().await?;
        self.after_match_closed(&cancelled, event_types::MATCH_CANCELLED, None)
            .await;
        Ok(true)
    }

    /// Resolve place negotiations whose decision window closed.
    pub async fn sweep_expired_decisions(&self, now: Timestamp) -> EngineResult<SweepReport> {
        let ids = match_ids(
            MatchRepo::list_decision_expired(&self.pool, now, self.config.sweep_batch_size)
                .await?,
        );
        Ok(self
            .sweep_each("decision_expiry", ids, |id| {
                self.resolve_decision_attempt(id, now)
            })
            .await)
    }

    async fn resolve_decision_attempt(&self, match_id: DbId, now: Timestamp) -> EngineResult<bool> {
        let mut tx = self.begin().await?;
        let Some(m) = MatchRepo::find_by_id(&mut *tx, match_id).await? else {
            return Ok(false);
        };
        let due = m.decision_deadline.is_some_and(|d| d <= now);
        if m.status != MatchStatus::LocationDeciding || !due {
            return Ok(false);
        }
        let (a, b) = (m.choice(Side::A).cloned(), m.choice(Side::B).cloned());
        let confirmed = self
            .resolve_in_tx(&mut *tx, &m, a.as_ref(), b.as_ref())
            .await?;
        tx.commit().await?;
        self.notify_match(event_types::MATCH_PLACE_CONFIRMED, &confirmed, None);
        Ok(true)
    }

    /// Resolve confirmations past their deadline, defaulting missing answers
    /// to `dismissed`.
    pub async fn sweep_expired_confirmations(&self, now: Timestamp) -> EngineResult<SweepReport> {
        let ids = match_ids(
            MatchRepo::list_confirmation_expired(&self.pool, now, self.config.sweep_batch_size)
                .await?,
        );
        Ok(self
            .sweep_each("confirmation_expiry", ids, |id| {
                self.resolve_confirmation_attempt(id, now)
            })
            .await)
    }

    async fn resolve_confirmation_attempt(
        &self,
        match_id: DbId,
        now: Timestamp,
    ) -> EngineResult<bool> {
        let mut tx = self.begin().await?;
        let Some(m) = MatchRepo::find_by_id(&mut *tx, match_id).await? else {
            return Ok(false);
        };
        let due = m.confirmation_deadline.is_some_and(|d| d <= now);
        if m.status != MatchStatus::ExpiredPendingConfirmation || !due {
            return Ok(false);
        }
        let (a, b) = with_defaults(m.confirmation(Side::A), m.confirmation(Side::B));
        let resolved = self
            .finish_confirmation_in_tx(&mut *tx, &m, a, b, now)
            .await?;
        tx.commit().await?;
        self.after_match_closed(&resolved, event_types::MATCH_RESOLVED, None)
            .await;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Housekeeping
    // -----------------------------------------------------------------------

    /// Purge expired idempotency records, old presence-start log entries,
    /// and lapsed rejection cooldowns.
    pub async fn sweep_idempotency_records(&self, now: Timestamp) -> EngineResult<SweepReport> {
        let records = IdempotencyRepo::purge_expired(&self.pool, now).await?;
        let starts =
            PresenceStartRepo::purge_before(&self.pool, now - self.config.start_rate_window)
                .await?;
        let cooldowns = CooldownRepo::purge_expired(&self.pool, now).await?;
        tracing::debug!(records, starts, cooldowns, "Housekeeping purge complete");
        Ok(SweepReport {
            processed: (records + starts + cooldowns) as usize,
            ..SweepReport::default()
        })
    }

    /// Drop pair guards that outlived their match.
    pub async fn sweep_orphaned_guards(&self, now: Timestamp) -> EngineResult<SweepReport> {
        let purged = PairGuardRepo::purge_orphaned(&self.pool, now).await?;
        Ok(SweepReport {
            processed: purged as usize,
            ..SweepReport::default()
        })
    }
}

fn match_ids(matches: Vec<Match>) -> Vec<DbId> {
    matches.into_iter().map(|m| m.id).collect()
}
