pub mod conversations;
pub mod error;
pub mod guard;
pub mod messages;
pub mod users;

use std::sync::Arc;

use parley_db::Database;
use parley_gateway::bus::EventBus;

pub type AppState = Arc<AppStateInner>;

/// Shared per-process state: the store handle and the event bus, both
/// constructed once in main and injected everywhere.
pub struct AppStateInner {
    pub db: Database,
    pub bus: EventBus,
}

#[cfg(test)]
pub(crate) mod testing;
