//! Runtime configuration types for the matching engine.
//!
//! These are the validated values components work with. Loading and parsing
//! the TOML file is the server crate's job.

mod collaborators;
mod config_store;
mod matching;
mod server;

pub use collaborators::CollaboratorConfig;
pub use config_store::{ConfigStore, ConfigWatcher};
pub use matching::MatchingConfig;
pub use server::{ServerConfig, StoreBackend};

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared configuration state with separate locks for each section.
#[derive(Clone)]
pub struct SharedConfig {
    /// Listen address and store backend.
    pub server: Arc<RwLock<ServerConfig>>,
    /// Matching parameters, read by the dispatcher each round and by the
    /// scheduler when it sets its sweep interval.
    pub matching: ConfigStore<MatchingConfig>,
    /// Where the calendar and notification collaborators live.
    pub collaborators: Arc<RwLock<CollaboratorConfig>>,
}

impl SharedConfig {
    pub fn new(
        server: ServerConfig,
        matching: MatchingConfig,
        collaborators: CollaboratorConfig,
    ) -> Self {
        Self {
            server: Arc::new(RwLock::new(server)),
            matching: ConfigStore::new(matching),
            collaborators: Arc::new(RwLock::new(collaborators)),
        }
    }
}
