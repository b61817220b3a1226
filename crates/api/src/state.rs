use std::sync::Arc;

use rendezvous_engine::Engine;

use crate::config::ServerConfig;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheap to clone: everything inside is a pool handle or behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub pool: rendezvous_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Domain operations. Shares the pool and owns the event bus handle.
    pub engine: Engine,
}
