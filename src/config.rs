//! Configuration loader (component L, §4.L, §6.6): the single JSON/TOML
//! configuration object every binary reads at startup, validated once via
//! a `try_deserialize`-then-`validate` pipeline.

use std::{net::IpAddr, path::Path};

use serde::Deserialize;

use crate::{error::HarnessError, transport::MigrationProtocol};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Parse(#[from] config::ConfigError),
    #[error("unknown migration protocol name: {0:?}")]
    UnknownProtocol(String),
    #[error("experiment id {0} is out of range 0..=6")]
    ExperimentIdOutOfRange(u32),
    #[error("serverMigrationProtocol is Explicit but serverMigrationHost/Port is missing")]
    MissingExplicitAddress,
    #[error("serverMigrationProtocol is Pool of Addresses but addressPool is empty")]
    EmptyAddressPool,
}

impl From<ConfigError> for HarnessError {
    fn from(e: ConfigError) -> Self {
        HarnessError::config(e.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPatternConfig {
    #[serde(default)]
    pub sporadic: bool,
    #[serde(default)]
    pub back_to_back: bool,
    /// Whole seconds between requests in the Sporadic pattern (§4.D).
    #[serde(default = "default_sporadic_interval_secs")]
    pub sporadic_interval: u64,
}

fn default_sporadic_interval_secs() -> u64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBodyConfig {
    #[serde(default)]
    pub fixed: bool,
    #[serde(default)]
    pub from_distribution: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMigrationConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub pool_of_addresses: bool,
    #[serde(default)]
    pub symmetric: bool,
    #[serde(default)]
    pub synchronized_symmetric: bool,
    #[serde(default)]
    pub address_pool: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentConfig {
    pub id: u32,
    pub notify_imminent_migration_after_request: Option<u64>,
    pub trigger_migration_after_request: Option<u64>,
    pub shutdown_after_request: Option<u64>,
    pub server_migration_protocol: String,
    pub server_migration_host: Option<IpAddr>,
    pub server_migration_port: Option<u16>,
    pub server_management_port: u16,
    pub container_migration_script_host: Option<IpAddr>,
    pub container_migration_script_port: Option<u16>,
}

impl ExperimentConfig {
    /// # Errors
    /// If `serverMigrationProtocol` doesn't name a known protocol.
    pub fn protocol(&self) -> Result<MigrationProtocol, ConfigError> {
        match self.server_migration_protocol.as_str() {
            "explicit" => Ok(MigrationProtocol::Explicit),
            "proactiveExplicit" => Ok(MigrationProtocol::ProactiveExplicit),
            "poolOfAddresses" => Ok(MigrationProtocol::PoolOfAddresses),
            "symmetric" => Ok(MigrationProtocol::Symmetric),
            "synchronizedSymmetric" => Ok(MigrationProtocol::SynchronizedSymmetric),
            other => Err(ConfigError::UnknownProtocol(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyLoggingConfig {
    #[serde(default)]
    pub enable: bool,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryFootprintInflationConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub additional_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub server_host: IpAddr,
    pub server_port: u16,
    pub management_port: u16,
    #[serde(default = "default_worker_threads")]
    pub number_of_worker_threads: usize,
    pub seed: u64,
    pub request_pattern: RequestPatternConfig,
    pub request_body: RequestBodyConfig,
    pub server_migration: ServerMigrationConfig,
    pub experiment: ExperimentConfig,
    #[serde(default)]
    pub key_logging: KeyLoggingConfig,
    #[serde(default)]
    pub memory_footprint_inflation: MemoryFootprintInflationConfig,
}

fn default_worker_threads() -> usize {
    4
}

impl Default for KeyLoggingConfig {
    fn default() -> Self {
        Self {
            enable: false,
            file: None,
        }
    }
}

impl Default for MemoryFootprintInflationConfig {
    fn default() -> Self {
        Self {
            enable: false,
            additional_bytes: 0,
        }
    }
}

impl Config {
    /// Loads a JSON or TOML configuration document from `path`, inferring
    /// the format from the file extension (defaulting to JSON).
    ///
    /// # Errors
    /// `ConfigError::Parse` on a malformed document; the validation errors
    /// of [`Config::validate`] on a well-formed but semantically invalid one.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => config::FileFormat::Toml,
            _ => config::FileFormat::Json,
        };
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(format))
            .build()?;
        let parsed: Self = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Parses an in-memory JSON document, as used by tests.
    ///
    /// # Errors
    /// Same as [`Config::from_file`].
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Json))
            .build()?;
        let parsed: Self = settings.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Startup validation per §7's `ConfigError` policy: fatal, checked once.
    ///
    /// # Errors
    /// On an unknown protocol name, an out-of-range experiment id, a missing
    /// Explicit destination, or an empty Pool-of-Addresses pool.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.experiment.id > 6 {
            return Err(ConfigError::ExperimentIdOutOfRange(self.experiment.id));
        }
        let protocol = self.experiment.protocol()?;
        if protocol.is_explicit_family()
            && (self.experiment.server_migration_host.is_none()
                || self.experiment.server_migration_port.is_none())
        {
            return Err(ConfigError::MissingExplicitAddress);
        }
        if matches!(protocol, MigrationProtocol::PoolOfAddresses)
            && self.server_migration.address_pool.is_empty()
        {
            return Err(ConfigError::EmptyAddressPool);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json(protocol: &str, host: &str, pool: &str) -> String {
        format!(
            r#"{{
                "serverHost": "127.0.0.1",
                "serverPort": 9000,
                "managementPort": 9001,
                "seed": 42,
                "requestPattern": {{ "backToBack": true }},
                "requestBody": {{ "fixed": true }},
                "serverMigration": {{ "enable": true, "addressPool": [{pool}] }},
                "experiment": {{
                    "id": 2,
                    "serverMigrationProtocol": "{protocol}",
                    "serverManagementPort": 9100
                    {host}
                }}
            }}"#
        )
    }

    #[test]
    fn valid_symmetric_config_parses() {
        let json = sample_json("symmetric", "", "");
        let cfg = Config::from_json_str(&json).unwrap();
        assert_eq!(cfg.experiment.id, 2);
    }

    #[test]
    fn unknown_protocol_name_is_rejected() {
        let json = sample_json("madeUpProtocol", "", "");
        assert!(matches!(
            Config::from_json_str(&json),
            Err(ConfigError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn explicit_without_address_is_rejected() {
        let json = sample_json("explicit", "", "");
        assert!(matches!(
            Config::from_json_str(&json),
            Err(ConfigError::MissingExplicitAddress)
        ));
    }

    #[test]
    fn pool_of_addresses_with_empty_pool_is_rejected() {
        let json = sample_json("poolOfAddresses", "", "");
        assert!(matches!(
            Config::from_json_str(&json),
            Err(ConfigError::EmptyAddressPool)
        ));
    }

    #[test]
    fn pool_of_addresses_with_nonempty_pool_is_accepted() {
        let json = sample_json("poolOfAddresses", "", "\"10.0.0.5:9000\"");
        Config::from_json_str(&json).unwrap();
    }
}
