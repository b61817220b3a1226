use chrono::Duration;
use rendezvous_core::candidates::{DEFAULT_HARD_CAP, DEFAULT_RADIUS_TIERS_M, DEFAULT_SOFT_MIN};
use rendezvous_core::geo::{GeoPoint, RegionBounds};
use rendezvous_core::idempotency::{DEFAULT_IDEMPOTENCY_TTL_SECS, DEFAULT_STALE_LOCK_SECS};
use rendezvous_core::matching::{
    DEFAULT_BASE_CANCEL_PENALTY, DEFAULT_CANCEL_GRACE_SECS, DEFAULT_CONFIRMATION_WINDOW_SECS,
    DEFAULT_DECISION_WINDOW_SECS, DEFAULT_MATCH_SESSION_EXTENSION_SECS,
    DEFAULT_PAIR_GUARD_TTL_SECS, DEFAULT_PENDING_MATCH_TIMEOUT_SECS,
};
use rendezvous_core::offer::{
    DEFAULT_MAX_OUTGOING_OFFERS, DEFAULT_OFFER_COOLDOWN_SECS, DEFAULT_OFFER_TTL_SECS,
    DEFAULT_REJECTION_COOLDOWN_SECS,
};
use rendezvous_core::presence::{
    DEFAULT_GRACE_PERIOD_SECS, DEFAULT_MAX_STARTS_PER_WINDOW, DEFAULT_START_RATE_WINDOW_SECS,
};

/// Tunables for the coordination engine.
///
/// Defaults match production values. Every field can be overridden from the
/// environment, see [`EngineConfig::from_env`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // Presence
    pub presence_grace: Duration,
    pub max_starts_per_window: i64,
    pub start_rate_window: Duration,

    // Offers
    pub offer_ttl: Duration,
    pub max_outgoing_offers: usize,
    pub offer_cooldown: Duration,
    pub rejection_cooldown: Duration,

    // Matches
    pub decision_window: Duration,
    pub confirmation_window: Duration,
    pub match_session_extension: Duration,
    pub pending_match_timeout: Duration,
    pub pair_guard_ttl: Duration,
    pub cancel_grace: Duration,
    pub base_cancel_penalty: i32,

    // Places
    pub radius_tiers_m: Vec<f64>,
    pub negotiation_soft_min: usize,
    pub negotiation_hard_cap: usize,
    pub region: RegionBounds,
    /// Search center used when neither participant has a stored location.
    pub default_center: GeoPoint,

    // Idempotency
    pub idempotency_ttl: Duration,
    pub stale_lock_threshold: Duration,

    /// Attempts per serializable transaction before giving up.
    pub max_tx_attempts: u32,
    /// Rows handled per sweep invocation.
    pub sweep_batch_size: i64,
    /// Upper bound on nearby-user results.
    pub max_discovery_results: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            presence_grace: Duration::seconds(DEFAULT_GRACE_PERIOD_SECS),
            max_starts_per_window: DEFAULT_MAX_STARTS_PER_WINDOW,
            start_rate_window: Duration::seconds(DEFAULT_START_RATE_WINDOW_SECS),
            offer_ttl: Duration::seconds(DEFAULT_OFFER_TTL_SECS),
            max_outgoing_offers: DEFAULT_MAX_OUTGOING_OFFERS,
            offer_cooldown: Duration::seconds(DEFAULT_OFFER_COOLDOWN_SECS),
            rejection_cooldown: Duration::seconds(DEFAULT_REJECTION_COOLDOWN_SECS),
            decision_window: Duration::seconds(DEFAULT_DECISION_WINDOW_SECS),
            confirmation_window: Duration::seconds(DEFAULT_CONFIRMATION_WINDOW_SECS),
            match_session_extension: Duration::seconds(DEFAULT_MATCH_SESSION_EXTENSION_SECS),
            pending_match_timeout: Duration::seconds(DEFAULT_PENDING_MATCH_TIMEOUT_SECS),
            pair_guard_ttl: Duration::seconds(DEFAULT_PAIR_GUARD_TTL_SECS),
            cancel_grace: Duration::seconds(DEFAULT_CANCEL_GRACE_SECS),
            base_cancel_penalty: DEFAULT_BASE_CANCEL_PENALTY,
            radius_tiers_m: DEFAULT_RADIUS_TIERS_M.to_vec(),
            negotiation_soft_min: DEFAULT_SOFT_MIN,
            negotiation_hard_cap: DEFAULT_HARD_CAP,
            region: RegionBounds::WORLD,
            default_center: GeoPoint::new(0.0, 0.0),
            idempotency_ttl: Duration::seconds(DEFAULT_IDEMPOTENCY_TTL_SECS),
            stale_lock_threshold: Duration::seconds(DEFAULT_STALE_LOCK_SECS),
            max_tx_attempts: 5,
            sweep_batch_size: 200,
            max_discovery_results: 50,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default               |
    /// |----------------------------------|-----------------------|
    /// | `PRESENCE_GRACE_SECS`            | `300`                 |
    /// | `PRESENCE_MAX_STARTS`            | `10`                  |
    /// | `PRESENCE_START_WINDOW_SECS`     | `3600`                |
    /// | `OFFER_TTL_SECS`                 | `600`                 |
    /// | `OFFER_MAX_OUTGOING`             | `3`                   |
    /// | `OFFER_COOLDOWN_SECS`            | `30`                  |
    /// | `REJECTION_COOLDOWN_SECS`        | `21600`               |
    /// | `DECISION_WINDOW_SECS`           | `600`                 |
    /// | `CONFIRMATION_WINDOW_SECS`       | `86400`               |
    /// | `MATCH_SESSION_EXTENSION_SECS`   | `10800`               |
    /// | `PENDING_MATCH_TIMEOUT_SECS`     | `900`                 |
    /// | `PAIR_GUARD_TTL_SECS`            | `21600`               |
    /// | `CANCEL_GRACE_SECS`              | `120`                 |
    /// | `BASE_CANCEL_PENALTY`            | `10`                  |
    /// | `PLACE_RADIUS_TIERS_M`           | `1000,2000,3000,5000` |
    /// | `PLACE_SOFT_MIN`                 | `6`                   |
    /// | `PLACE_HARD_CAP`                 | `9`                   |
    /// | `REGION_BOUNDS`                  | whole globe           |
    /// | `DEFAULT_CENTER`                 | `0,0`                 |
    /// | `IDEMPOTENCY_TTL_SECS`           | `86400`               |
    /// | `IDEMPOTENCY_STALE_LOCK_SECS`    | `60`                  |
    /// | `TX_MAX_ATTEMPTS`                | `5`                   |
    /// | `SWEEP_BATCH_SIZE`               | `200`                 |
    ///
    /// `REGION_BOUNDS` is `min_lat,max_lat,min_lng,max_lng`; `DEFAULT_CENTER`
    /// is `lat,lng`.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            presence_grace: env_secs("PRESENCE_GRACE_SECS", d.presence_grace),
            max_starts_per_window: env_parse("PRESENCE_MAX_STARTS", d.max_starts_per_window),
            start_rate_window: env_secs("PRESENCE_START_WINDOW_SECS", d.start_rate_window),
            offer_ttl: env_secs("OFFER_TTL_SECS", d.offer_ttl),
            max_outgoing_offers: env_parse("OFFER_MAX_OUTGOING", d.max_outgoing_offers),
            offer_cooldown: env_secs("OFFER_COOLDOWN_SECS", d.offer_cooldown),
            rejection_cooldown: env_secs("REJECTION_COOLDOWN_SECS", d.rejection_cooldown),
            decision_window: env_secs("DECISION_WINDOW_SECS", d.decision_window),
            confirmation_window: env_secs("CONFIRMATION_WINDOW_SECS", d.confirmation_window),
            match_session_extension: env_secs(
                "MATCH_SESSION_EXTENSION_SECS",
                d.match_session_extension,
            ),
            pending_match_timeout: env_secs("PENDING_MATCH_TIMEOUT_SECS", d.pending_match_timeout),
            pair_guard_ttl: env_secs("PAIR_GUARD_TTL_SECS", d.pair_guard_ttl),
            cancel_grace: env_secs("CANCEL_GRACE_SECS", d.cancel_grace),
            base_cancel_penalty: env_parse("BASE_CANCEL_PENALTY", d.base_cancel_penalty),
            radius_tiers_m: env_floats("PLACE_RADIUS_TIERS_M").unwrap_or(d.radius_tiers_m),
            negotiation_soft_min: env_parse("PLACE_SOFT_MIN", d.negotiation_soft_min),
            negotiation_hard_cap: env_parse("PLACE_HARD_CAP", d.negotiation_hard_cap),
            region: match env_floats("REGION_BOUNDS").as_deref() {
                Some(&[min_lat, max_lat, min_lng, max_lng]) => RegionBounds {
                    min_lat,
                    max_lat,
                    min_lng,
                    max_lng,
                },
                Some(_) => panic!("REGION_BOUNDS must be min_lat,max_lat,min_lng,max_lng"),
                None => d.region,
            },
            default_center: match env_floats("DEFAULT_CENTER").as_deref() {
                Some(&[lat, lng]) => GeoPoint::new(lat, lng),
                Some(_) => panic!("DEFAULT_CENTER must be lat,lng"),
                None => d.default_center,
            },
            idempotency_ttl: env_secs("IDEMPOTENCY_TTL_SECS", d.idempotency_ttl),
            stale_lock_threshold: env_secs("IDEMPOTENCY_STALE_LOCK_SECS", d.stale_lock_threshold),
            max_tx_attempts: env_parse("TX_MAX_ATTEMPTS", d.max_tx_attempts),
            sweep_batch_size: env_parse("SWEEP_BATCH_SIZE", d.sweep_batch_size),
            max_discovery_results: d.max_discovery_results,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid number")),
        Err(_) => default,
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    Duration::seconds(env_parse(name, default.num_seconds()))
}

fn env_floats(name: &str) -> Option<Vec<f64>> {
    let raw = std::env::var(name).ok()?;
    let values = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .unwrap_or_else(|_| panic!("{name} must be a comma-separated list of numbers"))
        })
        .collect();
    Some(values)
}
