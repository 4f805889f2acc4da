//! Application state shared across all request handlers.

use ridematch_core::config::SharedConfig;
use ridematch_core::matching::MatchingEngine;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// The matching engine, shared with the background processors.
    pub engine: MatchingEngine,
    /// Shared configuration (can be reloaded via SIGHUP).
    pub config: SharedConfig,
}

impl AppState {
    pub fn new(engine: MatchingEngine, config: SharedConfig) -> Self {
        Self { engine, config }
    }
}
