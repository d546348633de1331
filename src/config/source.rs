// src/config/source.rs
//! Configuration discovery
//!
//! The service does not read its configuration once at startup: it asks a
//! [`ConfigSource`] every time it is seeking configuration, so an operator
//! can drop a file in place while the service keeps retrying.

use super::config::MinerConfig;
use crate::utils::error::MinerError;
use directories::ProjectDirs;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "POOL_MINER_CONFIG";

/// File name of the per-user and system-wide configuration files
pub const CONFIG_FILE_NAME: &str = "pool-miner.toml";

/// Produces a validated configuration on demand
pub trait ConfigSource: Send + Sync {
    /// Returns the current configuration or the reason there is none
    fn load(&self) -> Result<MinerConfig, MinerError>;
}

/// Candidate locations for the configuration file, in priority order
#[derive(Debug, Clone, Default)]
pub struct ConfigLocations {
    /// Value of [`CONFIG_ENV_VAR`], if set and non-empty
    pub env: Option<PathBuf>,
    /// Per-user configuration file
    pub user: Option<PathBuf>,
    /// System-wide configuration file
    pub system: PathBuf,
}

impl ConfigLocations {
    /// Locations for the current process environment and platform
    pub fn from_env() -> Self {
        let env = env::var_os(CONFIG_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let user = ProjectDirs::from("", "", "pool-miner")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME));

        ConfigLocations {
            env,
            user,
            system: Path::new("/etc/pool-miner").join(CONFIG_FILE_NAME),
        }
    }

    /// Picks the configuration file to read
    ///
    /// # Returns
    /// The chosen path and whether it was specified explicitly by the user.
    /// The per-user file is only chosen if it exists; the system path is the
    /// fallback whether or not it exists.
    pub fn select(&self, explicit: Option<&Path>) -> (PathBuf, bool) {
        if let Some(path) = explicit {
            log::debug!("Using user-specified configuration file {}", path.display());
            return (path.to_path_buf(), true);
        }
        if let Some(path) = &self.env {
            log::debug!("Using {} {}", CONFIG_ENV_VAR, path.display());
            return (path.clone(), false);
        }
        if let Some(path) = self.user.as_ref().filter(|p| p.exists()) {
            log::debug!("Using user's configuration file {}", path.display());
            return (path.clone(), false);
        }
        log::debug!("Using system configuration file {}", self.system.display());
        (self.system.clone(), false)
    }
}

/// Reads the configuration from a TOML file on every load
pub struct FileConfigSource {
    explicit: Option<PathBuf>,
    locations: ConfigLocations,
}

impl FileConfigSource {
    /// Creates a source honoring an optional command-line path
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self::with_locations(explicit, ConfigLocations::from_env())
    }

    /// Creates a source with explicit fallback locations
    pub fn with_locations(explicit: Option<PathBuf>, locations: ConfigLocations) -> Self {
        FileConfigSource {
            explicit,
            locations,
        }
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<MinerConfig, MinerError> {
        let (path, _) = self.locations.select(self.explicit.as_deref());
        MinerConfig::load(&path).inspect_err(|e| {
            log::warn!("Configuration file {} could not be used: {}", path.display(), e);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("pool-miner-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn locations(dir: &Path) -> ConfigLocations {
        ConfigLocations {
            env: None,
            user: Some(dir.join("user").join(CONFIG_FILE_NAME)),
            system: dir.join("system").join(CONFIG_FILE_NAME),
        }
    }

    #[test]
    fn explicit_path_wins() {
        let dir = scratch_dir("explicit");
        let path = Path::new("/does/not/exist");
        let (chosen, specified) = locations(&dir).select(Some(path));
        assert_eq!(chosen, path);
        assert!(specified);
    }

    #[test]
    fn env_path_beats_user_file() {
        let dir = scratch_dir("env");
        let mut locs = locations(&dir);
        locs.env = Some(dir.join("from-env.toml"));
        let (chosen, specified) = locs.select(None);
        assert_eq!(chosen, dir.join("from-env.toml"));
        assert!(!specified);
    }

    #[test]
    fn existing_user_file_is_preferred() {
        let dir = scratch_dir("user");
        let locs = locations(&dir);
        let user = locs.user.clone().unwrap();
        fs::create_dir_all(user.parent().unwrap()).unwrap();
        fs::write(&user, "config file").unwrap();

        let (chosen, specified) = locs.select(None);
        assert_eq!(chosen, user);
        assert!(!specified);
    }

    #[test]
    fn falls_back_to_system_file() {
        let dir = scratch_dir("system");
        let locs = locations(&dir);
        let (chosen, specified) = locs.select(None);
        assert_eq!(chosen, locs.system);
        assert!(!specified);
    }

    #[test]
    fn file_source_picks_up_late_config() {
        let dir = scratch_dir("late");
        let path = dir.join(CONFIG_FILE_NAME);
        let source = FileConfigSource::with_locations(Some(path.clone()), locations(&dir));

        assert!(matches!(source.load(), Err(MinerError::ConfigError(_))));

        fs::write(&path, MinerConfig::generate_template()).unwrap();
        let config = source.load().unwrap();
        assert_eq!(config.pool_address(), "pool.example.com:1234");
    }
}
