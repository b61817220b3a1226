//! Sweep scheduling.
//!
//! [`run`] drives one [`Sweep`] on a fixed interval until cancelled; a
//! failing run is logged and retried on the next tick.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use rendezvous_engine::sweeps::SweepReport;
use rendezvous_engine::{Engine, EngineResult};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

/// One reconciliation pass the worker schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sweep {
    ExpiredOffers,
    ExpiredPresences,
    StalePendingMatches,
    ExpiredDecisions,
    ExpiredConfirmations,
    /// Idempotency records, presence-start log and lapsed cooldowns.
    Housekeeping,
    OrphanedGuards,
}

impl Sweep {
    pub const ALL: [Sweep; 7] = [
        Sweep::ExpiredOffers,
        Sweep::ExpiredPresences,
        Sweep::StalePendingMatches,
        Sweep::ExpiredDecisions,
        Sweep::ExpiredConfirmations,
        Sweep::Housekeeping,
        Sweep::OrphanedGuards,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Sweep::ExpiredOffers => "expired_offers",
            Sweep::ExpiredPresences => "expired_presences",
            Sweep::StalePendingMatches => "stale_pending_matches",
            Sweep::ExpiredDecisions => "expired_decisions",
            Sweep::ExpiredConfirmations => "expired_confirmations",
            Sweep::Housekeeping => "housekeeping",
            Sweep::OrphanedGuards => "orphaned_guards",
        }
    }

    /// Run the sweep once against the current time.
    pub async fn run_once(self, engine: &Engine) -> EngineResult<SweepReport> {
        let now = Utc::now();
        match self {
            Sweep::ExpiredOffers => engine.sweep_expired_offers(now).await,
            Sweep::ExpiredPresences => engine.sweep_expired_presences(now).await,
            Sweep::StalePendingMatches => engine.sweep_stale_pending_matches(now).await,
            Sweep::ExpiredDecisions => engine.sweep_expired_decisions(now).await,
            Sweep::ExpiredConfirmations => engine.sweep_expired_confirmations(now).await,
            Sweep::Housekeeping => engine.sweep_idempotency_records(now).await,
            Sweep::OrphanedGuards => engine.sweep_orphaned_guards(now).await,
        }
    }
}

/// Run `sweep` every `period` until `cancel` is triggered.
pub async fn run(engine: Engine, sweep: Sweep, period: Duration, cancel: CancellationToken) {
    let name = sweep.name();
    tracing::info!(sweep = name, interval_secs = period.as_secs(), "Sweep job started");

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(sweep = name, "Sweep job stopping");
                break;
            }
            _ = interval.tick() => {
                match sweep.run_once(&engine).await {
                    Ok(report) if report.processed > 0 || report.failed > 0 => {
                        tracing::info!(
                            sweep = name,
                            processed = report.processed,
                            skipped = report.skipped,
                            failed = report.failed,
                            "Sweep run finished"
                        );
                    }
                    Ok(_) => tracing::debug!(sweep = name, "Sweep run found nothing to do"),
                    Err(e) => tracing::error!(sweep = name, error = %e, "Sweep run failed"),
                }
            }
        }
    }
}

/// Spawn one task per sweep. Each task holds its own engine handle.
pub fn spawn_all(
    engine: &Engine,
    config: &WorkerConfig,
    cancel: &CancellationToken,
) -> HashMap<Sweep, JoinHandle<()>> {
    Sweep::ALL
        .into_iter()
        .map(|sweep| {
            let handle = tokio::spawn(run(
                engine.clone(),
                sweep,
                config.interval_for(sweep),
                cancel.clone(),
            ));
            (sweep, handle)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn sweep_names_are_unique() {
        let names: HashSet<_> = Sweep::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), Sweep::ALL.len());
    }
}
