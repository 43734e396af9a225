use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = "ad_insertion";
const CONFIG_FILE: &str = "session.json";

/// How the controller reacts when the ad session reports an illegal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationPolicy {
    /// Abort the session and surface the violation to the host.
    Strict,
    /// Drop the ad session and carry on with content.
    Lenient,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        ViolationPolicy::Lenient
    }
}

impl fmt::Display for ViolationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationPolicy::Strict => write!(f, "strict"),
            ViolationPolicy::Lenient => write!(f, "lenient"),
        }
    }
}

impl ViolationPolicy {
    /// Parse a policy name (case-insensitive).
    pub fn from_str_loose(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(ViolationPolicy::Strict),
            "lenient" => Ok(ViolationPolicy::Lenient),
            _ => Err(ConfigError::Invalid(format!(
                "Unknown violation policy '{}'. Expected: strict, lenient",
                s
            ))),
        }
    }
}

fn default_progress_interval_ms() -> u64 {
    200
}

fn default_bridge_poll_interval_ms() -> u64 {
    50
}

/// Per-session controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub illegal_operation_policy: ViolationPolicy,
    /// Progress sampler cadence.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// How often the runtime polls bridges that do not post their own events.
    #[serde(default = "default_bridge_poll_interval_ms")]
    pub bridge_poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            illegal_operation_policy: ViolationPolicy::default(),
            progress_interval_ms: default_progress_interval_ms(),
            bridge_poll_interval_ms: default_bridge_poll_interval_ms(),
        }
    }
}

impl SessionConfig {
    pub fn strict() -> Self {
        SessionConfig {
            illegal_operation_policy: ViolationPolicy::Strict,
            ..Self::default()
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn bridge_poll_interval(&self) -> Duration {
        Duration::from_millis(self.bridge_poll_interval_ms)
    }

    /// `<config dir>/ad_insertion/session.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from JSON, falling back to defaults when the file is absent or corrupt.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match Self::read(path) {
                Ok(config) => return config,
                Err(e) => log::warn!("Ignoring session config, using defaults: {}", e),
            }
        }
        Self::default()
    }

    /// Strict variant of [`SessionConfig::load`]: any read or parse failure is an error.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SessionConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.progress_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "progress_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.bridge_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "bridge_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_sampler_cadence() {
        let config = SessionConfig::default();
        assert_eq!(config.progress_interval(), Duration::from_millis(200));
        assert_eq!(config.illegal_operation_policy, ViolationPolicy::Lenient);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"illegal_operation_policy":"strict"}"#).unwrap();
        assert_eq!(config.illegal_operation_policy, ViolationPolicy::Strict);
        assert_eq!(config.progress_interval_ms, 200);
        assert_eq!(config.bridge_poll_interval_ms, 50);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let mut config = SessionConfig::strict();
        config.progress_interval_ms = 250;
        config.save(&path).unwrap();
        assert_eq!(SessionConfig::load(&path), config);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(SessionConfig::load(&path), SessionConfig::default());
        assert!(matches!(
            SessionConfig::read(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn zero_interval_rejected() {
        let config = SessionConfig {
            progress_interval_ms: 0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
        let dir = tempfile::tempdir().unwrap();
        assert!(config.save(&dir.path().join("session.json")).is_err());
    }

    #[test]
    fn policy_parses_loosely() {
        assert_eq!(
            ViolationPolicy::from_str_loose("STRICT").unwrap(),
            ViolationPolicy::Strict
        );
        assert_eq!(
            ViolationPolicy::from_str_loose("lenient").unwrap(),
            ViolationPolicy::Lenient
        );
        assert!(ViolationPolicy::from_str_loose("debug").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::load(&dir.path().join("absent.json"));
        assert_eq!(config, SessionConfig::default());
    }
}
