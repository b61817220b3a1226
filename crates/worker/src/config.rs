use std::time::Duration;

use crate::jobs::Sweep;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub offer_expiry_interval: Duration,
    pub presence_expiry_interval: Duration,
    pub stale_pending_interval: Duration,
    pub decision_expiry_interval: Duration,
    pub confirmation_expiry_interval: Duration,
    pub housekeeping_interval: Duration,
    pub guard_sweep_interval: Duration,
    /// How long to wait for running sweeps after shutdown is requested.
    pub shutdown_timeout: Duration,
    /// Push webhook endpoint. Events are only logged when unset.
    pub push_webhook_url: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            offer_expiry_interval: Duration::from_secs(15),
            presence_expiry_interval: Duration::from_secs(30),
            stale_pending_interval: Duration::from_secs(60),
            decision_expiry_interval: Duration::from_secs(15),
            confirmation_expiry_interval: Duration::from_secs(300),
            housekeeping_interval: Duration::from_secs(3600),
            guard_sweep_interval: Duration::from_secs(900),
            shutdown_timeout: Duration::from_secs(10),
            push_webhook_url: None,
        }
    }
}

fn secs_from_env(name: &str, default: Duration) -> Duration {
    match std::env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .unwrap_or_else(|_| panic!("{name} must be a valid u64"));
            assert!(secs > 0, "{name} must be positive");
            Duration::from_secs(secs)
        }
        Err(_) => default,
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                             | Default |
    /// |-------------------------------------|---------|
    /// | `SWEEP_OFFERS_INTERVAL_SECS`        | `15`    |
    /// | `SWEEP_PRESENCES_INTERVAL_SECS`     | `30`    |
    /// | `SWEEP_PENDING_MATCHES_INTERVAL_SECS` | `60`  |
    /// | `SWEEP_DECISIONS_INTERVAL_SECS`     | `15`    |
    /// | `SWEEP_CONFIRMATIONS_INTERVAL_SECS` | `300`   |
    /// | `SWEEP_HOUSEKEEPING_INTERVAL_SECS`  | `3600`  |
    /// | `SWEEP_GUARDS_INTERVAL_SECS`        | `900`   |
    /// | `SHUTDOWN_TIMEOUT_SECS`             | `10`    |
    /// | `PUSH_WEBHOOK_URL`                  | unset   |
    ///
    /// The sweep batch size is part of the engine configuration
    /// (`SWEEP_BATCH_SIZE`).
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            offer_expiry_interval: secs_from_env("SWEEP_OFFERS_INTERVAL_SECS", d.offer_expiry_interval),
            presence_expiry_interval: secs_from_env(
                "SWEEP_PRESENCES_INTERVAL_SECS",
                d.presence_expiry_interval,
            ),
            stale_pending_interval: secs_from_env(
                "SWEEP_PENDING_MATCHES_INTERVAL_SECS",
                d.stale_pending_interval,
            ),
            decision_expiry_interval: secs_from_env(
                "SWEEP_DECISIONS_INTERVAL_SECS",
                d.decision_expiry_interval,
            ),
            confirmation_expiry_interval: secs_from_env(
                "SWEEP_CONFIRMATIONS_INTERVAL_SECS",
                d.confirmation_expiry_interval,
            ),
            housekeeping_interval: secs_from_env(
                "SWEEP_HOUSEKEEPING_INTERVAL_SECS",
                d.housekeeping_interval,
            ),
            guard_sweep_interval: secs_from_env("SWEEP_GUARDS_INTERVAL_SECS", d.guard_sweep_interval),
            shutdown_timeout: secs_from_env("SHUTDOWN_TIMEOUT_SECS", d.shutdown_timeout),
            push_webhook_url: std::env::var("PUSH_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn interval_for(&self, sweep: Sweep) -> Duration {
        match sweep {
            Sweep::ExpiredOffers => self.offer_expiry_interval,
            Sweep::ExpiredPresences => self.presence_expiry_interval,
            Sweep::StalePendingMatches => self.stale_pending_interval,
            Sweep::ExpiredDecisions => self.decision_expiry_interval,
            Sweep::ExpiredConfirmations => self.confirmation_expiry_interval,
            Sweep::Housekeeping => self.housekeeping_interval,
            Sweep::OrphanedGuards => self.guard_sweep_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_sweep_has_a_positive_interval() {
        let config = WorkerConfig::default();
        for sweep in Sweep::ALL {
            assert!(config.interval_for(sweep) > Duration::ZERO, "{}", sweep.name());
        }
    }

    #[test]
    fn deadline_sweeps_run_more_often_than_housekeeping() {
        let config = WorkerConfig::default();
        assert!(config.offer_expiry_interval < config.housekeeping_interval);
        assert!(config.decision_expiry_interval < config.housekeeping_interval);
    }
}
