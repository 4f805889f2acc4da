//! Configuration module for ridematch-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::{FileConfig, StoreKind};
use ridematch_core::config::{
    CollaboratorConfig, MatchingConfig, ServerConfig, SharedConfig, StoreBackend,
};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub matching: MatchingConfig,
    pub collaborators: CollaboratorConfig,
}

impl LoadedConfig {
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig::new(self.server, self.matching, self.collaborators)
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
    store_override: Option<StoreKind>,
}

impl ConfigLoader {
    pub fn new(
        config_path: impl AsRef<Path>,
        listen_override: Option<SocketAddr>,
        store_override: Option<StoreKind>,
    ) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
            store_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// A missing file is not an error: every section has defaults.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = ?self.config_path, "Config file not found, using defaults");
                FileConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        if let Some(store) = self.store_override {
            file_config.server.store = store;
        }

        self.validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let matching = &config.matching;
        if matching.immediate_offer_window_secs == 0 || matching.prebooked_offer_window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "offer windows must be at least one second".to_string(),
            ));
        }
        if matching.max_offers_per_round == Some(0) {
            return Err(ConfigError::ValidationError(
                "max_offers_per_round must be positive when set".to_string(),
            ));
        }
        if matching.sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        if matching.sweep_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "sweep_batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn seconds(secs: u64) -> time::Duration {
    time::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let m = file_config.matching;
    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
            store: match file_config.server.store {
                StoreKind::Memory => StoreBackend::Memory,
                StoreKind::Postgres => StoreBackend::Postgres,
            },
        },
        matching: MatchingConfig {
            immediate_offer_window: seconds(m.immediate_offer_window_secs),
            prebooked_offer_window: seconds(m.prebooked_offer_window_secs),
            max_offers_per_round: m.max_offers_per_round,
            sweep_interval: seconds(m.sweep_interval_secs),
            prebook_lead: seconds(m.prebook_lead_secs),
            immediate_match_deadline: seconds(m.immediate_match_deadline_secs),
            prebooked_cutoff: seconds(m.prebooked_cutoff_secs),
            heartbeat_timeout: seconds(m.heartbeat_timeout_secs),
            schedule_buffer: seconds(m.schedule_buffer_secs),
            calendar_max_attempts: m.calendar_max_attempts,
            calendar_timeout: seconds(m.calendar_timeout_secs),
            sweep_batch_size: m.sweep_batch_size,
        },
        collaborators: CollaboratorConfig {
            calendar_url: file_config.collaborators.calendar_url,
            notification_url: file_config.collaborators.notification_url,
            request_timeout: std::time::Duration::from_secs(
                file_config.collaborators.request_timeout_secs,
            ),
        },
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_core_defaults() {
        let loaded = build_loaded_config(FileConfig::default());
        assert_eq!(loaded.matching, MatchingConfig::default());
        assert_eq!(loaded.server.store, StoreBackend::Memory);
    }

    #[test]
    fn test_zero_top_k_is_rejected() {
        let loader = ConfigLoader::new("unused.toml", None, None);
        let mut config = FileConfig::default();
        config.matching.max_offers_per_round = Some(0);
        assert!(matches!(
            loader.validate(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
