//! Pair guard: at most one active match per unordered pair of users.
//!
//! The guard row is advisory and has a TTL; the partial unique index on
//! `matches` is the backstop when a stale guard is overwritten.

use rendezvous_core::matching::pair_key;
use rendezvous_core::presence::PresenceStatus;
use rendezvous_core::types::{DbId, Timestamp};
use rendezvous_db::models::matches::{Match, NewMatch};
use rendezvous_db::models::presence::PresenceSession;
use rendezvous_db::repositories::{MatchRepo, PairGuardRepo, PresenceRepo};
use sqlx::PgConnection;

use crate::error::EngineResult;
use crate::Engine;

/// Result of [`Engine::create_match_in_tx`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchCreation {
    pub match_id: DbId,
    /// `false` when an existing active match was returned instead.
    pub created: bool,
}

/// The active match a presence is linked to. A `matched` claim whose match
/// is missing or no longer active is ignored.
pub(crate) async fn linked_active_match(
    conn: &mut PgConnection,
    presence: &PresenceSession,
) -> EngineResult<Option<Match>> {
    let (PresenceStatus::Matched, Some(match_id)) = (presence.status, presence.match_id) else {
        return Ok(None);
    };
    Ok(MatchRepo::find_by_id(&mut *conn, match_id)
        .await?
        .filter(|m| m.status.is_active()))
}

impl Engine {
    /// Create a match for the pair inside the caller's transaction, or return
    /// the active match one of them is already in.
    ///
    /// On creation the guard is written and both presences flip to `matched`
    /// with their expiry extended to cover the meetup.
    pub(crate) async fn create_match_in_tx(
        &self,
        conn: &mut PgConnection,
        user_x: DbId,
        user_y: DbId,
        activity: &str,
        now: Timestamp,
    ) -> EngineResult<MatchCreation> {
        let (low, high) = pair_key(user_x, user_y);

        if let Some(guard) = PairGuardRepo::find(&mut *conn, low, high).await? {
            let guarded = MatchRepo::find_by_id(&mut *conn, guard.match_id).await?;
            if let Some(m) = guarded.filter(|m| m.status.is_active()) {
                return Ok(MatchCreation {
                    match_id: m.id,
                    created: false,
                });
            }
        }

        for user_id in [low, high] {
            let Some(presence) = PresenceRepo::find(&mut *conn, user_id).await? else {
                continue;
            };
            if let Some(m) = linked_active_match(&mut *conn, &presence).await? {
                return Ok(MatchCreation {
                    match_id: m.id,
                    created: false,
                });
            }
        }

        let m = MatchRepo::create(
            &mut *conn,
            &NewMatch {
                user_low: low,
                user_high: high,
                activity: activity.to_string(),
            },
        )
        .await?;
        PairGuardRepo::upsert(&mut *conn, low, high, m.id, now + self.config.pair_guard_ttl)
            .await?;

        let min_expires_at = now + self.config.match_session_extension;
        for user_id in [low, high] {
            PresenceRepo::mark_matched(&mut *conn, user_id, m.id, min_expires_at).await?;
        }

        tracing::info!(match_id = m.id, user_a = low, user_b = high, activity, "Match created");
        Ok(MatchCreation {
            match_id: m.id,
            created: true,
        })
    }

    /// Drop the pair guard after a match reaches a terminal state.
    ///
    /// Best-effort: a leftover guard is harmless and purged by the sweep.
    pub(crate) async fn release_guard(&self, m: &Match) {
        match PairGuardRepo::release(&self.pool, m.user_a, m.user_b, m.id).await {
            Ok(true) => tracing::debug!(match_id = m.id, "Pair guard released"),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(match_id = m.id, error = %e, "Failed to release pair guard");
            }
        }
    }
}
