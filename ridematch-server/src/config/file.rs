//! TOML file configuration structures.
//!
//! These structs directly map to the `ridematch-config.toml` file format.
//! Every field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
}

/// Which store backs the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Postgres,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub store: StoreKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            store: StoreKind::default(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Matching section. Durations are whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub immediate_offer_window_secs: u64,
    pub prebooked_offer_window_secs: u64,
    /// Omit to offer every eligible driver at once.
    pub max_offers_per_round: Option<usize>,
    pub sweep_interval_secs: u64,
    pub prebook_lead_secs: u64,
    pub immediate_match_deadline_secs: u64,
    pub prebooked_cutoff_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub schedule_buffer_secs: u64,
    pub calendar_max_attempts: u32,
    pub calendar_timeout_secs: u64,
    pub sweep_batch_size: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            immediate_offer_window_secs: 30,
            prebooked_offer_window_secs: 2 * 60 * 60,
            max_offers_per_round: Some(5),
            sweep_interval_secs: 5,
            prebook_lead_secs: 60 * 60,
            immediate_match_deadline_secs: 10 * 60,
            prebooked_cutoff_secs: 15 * 60,
            heartbeat_timeout_secs: 90,
            schedule_buffer_secs: 15 * 60,
            calendar_max_attempts: 12,
            calendar_timeout_secs: 10,
            sweep_batch_size: 100,
        }
    }
}

/// External services. A missing URL falls back to logging the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorConfig {
    pub calendar_url: Option<Url>,
    pub notification_url: Option<Url>,
    pub request_timeout_secs: u64,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            calendar_url: None,
            notification_url: None,
            request_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"
store = "postgres"

[matching]
immediate_offer_window_secs = 45
max_offers_per_round = 3

[collaborators]
calendar_url = "https://calendar.example.com/bookings"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.server.store, StoreKind::Postgres);
        assert_eq!(config.matching.immediate_offer_window_secs, 45);
        assert_eq!(config.matching.max_offers_per_round, Some(3));
        assert_eq!(config.matching.prebooked_offer_window_secs, 7200);
        assert_eq!(config.matching.heartbeat_timeout_secs, 90);
        assert!(config.collaborators.calendar_url.is_some());
        assert!(config.collaborators.notification_url.is_none());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.server.store, StoreKind::Memory);
        assert_eq!(config.matching.max_offers_per_round, Some(5));
        assert_eq!(config.collaborators.request_timeout_secs, 30);
    }
}
