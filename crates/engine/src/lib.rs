//! Coordination engine for spontaneous meetups.
//!
//! Owns every state-changing operation: presence, offers, matches, place
//! negotiation, meeting confirmation, and the expiry sweeps. Each operation
//! runs in a SERIALIZABLE transaction (see [`transaction`]) and publishes
//! its notifications on the [`EventBus`] only after commit.

use std::sync::Arc;

use rendezvous_db::DbPool;
use rendezvous_events::EventBus;

pub mod config;
pub mod confirmation;
pub mod discovery;
pub mod error;
pub mod idempotency;
pub mod match_guard;
pub mod matches;
pub mod negotiation;
pub mod notify;
pub mod offers;
pub mod places;
pub mod presence;
pub mod sweeps;
pub mod transaction;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};

/// Shared handle to the engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    pool: DbPool,
    config: Arc<EngineConfig>,
    events: Arc<EventBus>,
}

impl Engine {
    pub fn new(pool: DbPool, config: EngineConfig, events: Arc<EventBus>) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            events,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }
}
