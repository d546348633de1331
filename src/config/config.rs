// src/config/config.rs
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Validated configuration for the mining service
///
/// Produced by a [`ConfigSource`](super::ConfigSource) and treated as an
/// opaque value by the orchestrator, which only hands it to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Miner identity and worker settings
    pub miner: MinerSettings,

    /// Pool connection settings
    pub pool: PoolSettings,
}

/// `[miner]` section of the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerSettings {
    /// Account e-mail address registered with the pool
    pub username: String,

    /// Identifier of this worker, reported with every share
    #[serde(rename = "minerid")]
    pub miner_id: String,

    /// Number of worker threads
    /// (default: number of CPU cores)
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Size of nonce batches each worker processes at once
    /// (default: 1000)
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
}

/// `[pool]` section of the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Pool address in `host:port` form
    pub host: String,
}

fn default_threads() -> usize {
    num_cpus::get()
}

fn default_batch_size() -> u64 {
    1000
}

impl MinerConfig {
    /// Loads and validates configuration from a TOML file
    ///
    /// # Returns
    /// * `Ok(MinerConfig)` - Successfully loaded configuration
    /// * `Err(MinerError::ConfigError)` - If the file is unreadable, malformed or invalid
    pub fn load(path: &Path) -> Result<Self, MinerError> {
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml_str(&config_str)
    }

    /// Parses and validates configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, MinerError> {
        let config: MinerConfig = toml::from_str(text)
            .map_err(|e| MinerError::ConfigError(format!("Invalid config format: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the semantic constraints serde cannot express
    pub fn validate(&self) -> Result<(), MinerError> {
        if !self.miner.username.contains('@') {
            return Err(MinerError::ConfigError(
                "miner.username should be an e-mail address and must contain '@'".into(),
            ));
        }
        if self.miner.miner_id.is_empty() {
            return Err(MinerError::ConfigError(
                "miner.minerid must not be an empty string".into(),
            ));
        }
        if self.miner.threads < 1 {
            return Err(MinerError::ConfigError(
                "miner.threads must be a positive value".into(),
            ));
        }
        if self.miner.batch_size < 1 {
            return Err(MinerError::ConfigError(
                "miner.batch_size must be a positive value".into(),
            ));
        }
        if !has_valid_port(&self.pool.host) {
            return Err(MinerError::ConfigError(format!(
                "pool.host must be host:port, got '{}'",
                self.pool.host
            )));
        }
        Ok(())
    }

    /// Pool address the engine connects to
    pub fn pool_address(&self) -> &str {
        &self.pool.host
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# Pool miner configuration\n\n");
        template.push_str("[miner]\n");
        template.push_str("# E-mail address of the pool account\n");
        template.push_str("username = \"you@example.com\"\n");
        template.push_str("# Name of this worker as shown by the pool\n");
        template.push_str("minerid = \"worker01\"\n");
        template.push_str("# Number of worker threads (defaults to the number of CPU cores)\n");
        template.push_str(&format!("threads = {}\n", default_threads()));
        template.push_str("# Nonce batch size per worker\n");
        template.push_str("batch_size = 1000\n\n");
        template.push_str("[pool]\n");
        template.push_str("# Pool address, host and port\n");
        template.push_str("host = \"pool.example.com:1234\"\n");
        template
    }
}

fn has_valid_port(host_and_port: &str) -> bool {
    match host_and_port.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && port.parse::<u16>().map(|p| p > 0).unwrap_or(false)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        [miner]
        username = "operator@example.com"
        minerid = "rig-7"
        threads = 2

        [pool]
        host = "127.0.0.1:4444"
    "#;

    #[test]
    fn parses_valid_config_with_defaults() {
        let config = MinerConfig::from_toml_str(VALID).unwrap();
        assert_eq!(config.miner.miner_id, "rig-7");
        assert_eq!(config.miner.threads, 2);
        assert_eq!(config.miner.batch_size, 1000);
        assert_eq!(config.pool_address(), "127.0.0.1:4444");
    }

    #[test]
    fn rejects_username_without_at_sign() {
        let text = VALID.replace("operator@example.com", "operator");
        let err = MinerConfig::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("miner.username"));
    }

    #[test]
    fn rejects_empty_miner_id() {
        let text = VALID.replace("rig-7", "");
        assert!(matches!(
            MinerConfig::from_toml_str(&text),
            Err(MinerError::ConfigError(_))
        ));
    }

    #[test]
    fn rejects_zero_threads() {
        let text = VALID.replace("threads = 2", "threads = 0");
        assert!(MinerConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn pool_host_requires_port() {
        assert!(has_valid_port("pool.example.com:1234"));
        assert!(has_valid_port("[::1]:65535"));
        assert!(!has_valid_port("pool.example.com"));
        assert!(!has_valid_port("pool.example.com:"));
        assert!(!has_valid_port("pool.example.com:70000"));
        assert!(!has_valid_port(":1234"));
        assert!(!has_valid_port("pool.example.com:0"));
    }

    #[test]
    fn template_is_a_valid_config() {
        assert!(MinerConfig::from_toml_str(&MinerConfig::generate_template()).is_ok());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = MinerConfig::load(Path::new("/does/not/exist.toml")).unwrap_err();
        assert!(matches!(err, MinerError::ConfigError(_)));
    }
}
