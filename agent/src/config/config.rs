use serde::Deserialize;
use shared::constants::{
    DEFAULT_DEVICE_PATH, DEFAULT_EXTRACTION_QUEUE_BYTES, DEFAULT_INJECTION_QUEUE_BYTES,
};
use shared::errors::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

/// Full agent configuration, loaded from TOML. Every section and key has a
/// default so the agent runs without a file at all.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// REST server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Driver device settings
    #[serde(default)]
    pub driver: DriverConfig,
    /// Probe streaming settings
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// `[server]` section.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port of the REST server
    pub port: u16,
    /// Raise the log spec from info to debug
    pub verbose: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9090,
            verbose: false,
        }
    }
}

/// `[driver]` section.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DriverConfig {
    /// Character device of the debug driver
    pub device_path: PathBuf,
    /// Size of the shared ring-buffer mapping
    pub ring_mmap_bytes: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
            ring_mmap_bytes: 1024 * 1024,
        }
    }
}

/// `[probe]` section.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProbeConfig {
    /// Byte budget of each extraction queue
    pub extraction_queue_bytes: usize,
    /// Byte budget of each injection queue
    pub injection_queue_bytes: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            extraction_queue_bytes: DEFAULT_EXTRACTION_QUEUE_BYTES,
            injection_queue_bytes: DEFAULT_INJECTION_QUEUE_BYTES,
        }
    }
}

impl Config {
    /// Load, parse and validate a `Config` from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let cfg: Config = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like [`load`](Self::load), but a missing file falls back to the
    /// defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must be 1-65535".into()));
        }
        if self.driver.ring_mmap_bytes == 0 {
            return Err(ConfigError::Validation(
                "driver.ring_mmap_bytes must be > 0".into(),
            ));
        }
        if self.probe.extraction_queue_bytes == 0 || self.probe.injection_queue_bytes == 0 {
            return Err(ConfigError::Validation(
                "probe queue budgets must be > 0".into(),
            ));
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn from_str(toml: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(toml)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    [server]
    port    = 8080
    verbose = true

    [driver]
    device_path     = "/dev/adsp-dbg0"
    ring_mmap_bytes = 2097152

    [probe]
    extraction_queue_bytes = 1048576
    injection_queue_bytes  = 524288
    "#;

    #[test]
    fn parse_full_config() {
        let cfg = Config::from_str(SAMPLE).expect("should parse full sample");
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.server.verbose);
        assert_eq!(cfg.driver.device_path, PathBuf::from("/dev/adsp-dbg0"));
        assert_eq!(cfg.driver.ring_mmap_bytes, 2 * 1024 * 1024);
        assert_eq!(cfg.probe.extraction_queue_bytes, 1024 * 1024);
        assert_eq!(cfg.probe.injection_queue_bytes, 512 * 1024);
    }

    #[test]
    fn missing_sections_take_defaults() {
        let cfg = Config::from_str("").unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert!(!cfg.server.verbose);
        assert_eq!(cfg.driver.device_path, PathBuf::from(DEFAULT_DEVICE_PATH));
        assert_eq!(cfg.probe.extraction_queue_bytes, DEFAULT_EXTRACTION_QUEUE_BYTES);
    }

    #[test]
    fn zero_port_is_rejected() {
        let toml = "[server]\nport = 0\n";
        assert!(matches!(
            Config::from_str(toml).unwrap_err(),
            ConfigError::Validation(_)
        ));
    }

    #[test]
    fn zero_queue_budget_is_rejected() {
        let toml = "[probe]\nextraction_queue_bytes = 0\n";
        assert!(matches!(
            Config::from_str(toml).unwrap_err(),
            ConfigError::Validation(_)
        ));
    }

    #[test]
    fn type_errors_are_parse_errors() {
        let toml = "[server]\nport = \"many\"\n";
        assert!(matches!(
            Config::from_str(toml).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn load_or_default_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        let cfg = Config::load_or_default(&path).unwrap();
        assert_eq!(cfg.server.port, 9090);

        std::fs::write(&path, "[server]\nport = 7070\n").unwrap();
        let cfg = Config::load_or_default(&path).unwrap();
        assert_eq!(cfg.server.port, 7070);
    }
}
