//! Runtime configuration: a TOML file overlaid with CLI flags.

use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::catalog::Severity;
use crate::error::ConfigError;

fn default_true() -> bool {
    true
}

fn default_log_path() -> PathBuf {
    PathBuf::from("/var/log/grimoire/alerts.jsonl")
}

fn default_ring_buffer_bytes() -> usize {
    1 << 20
}

fn default_process_table_cap() -> usize {
    8192
}

fn default_poll_timeout_ms() -> u64 {
    100
}

fn default_min_log_severity() -> String {
    "info".to_string()
}

fn default_min_enforce_severity() -> String {
    "critical".to_string()
}

/// The on-disk (TOML) shape of the config file. Severities are parsed as
/// strings here and converted to [`Severity`] in [`Config::from_file`] so
/// an invalid value is a single, clearly attributed [`ConfigError`].
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_true")]
    enable: bool,
    #[serde(default)]
    enforce: bool,
    #[serde(default = "default_min_log_severity")]
    min_log_severity: String,
    #[serde(default = "default_min_enforce_severity")]
    min_enforce_severity: String,
    #[serde(default = "default_log_path")]
    log_path: PathBuf,
    #[serde(default = "default_ring_buffer_bytes")]
    ring_buffer_bytes: usize,
    #[serde(default = "default_process_table_cap")]
    process_table_cap: usize,
    #[serde(default)]
    process_whitelist: Vec<String>,
    #[serde(default = "default_poll_timeout_ms")]
    poll_timeout_ms: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        RawConfig {
            enable: default_true(),
            enforce: false,
            min_log_severity: default_min_log_severity(),
            min_enforce_severity: default_min_enforce_severity(),
            log_path: default_log_path(),
            ring_buffer_bytes: default_ring_buffer_bytes(),
            process_table_cap: default_process_table_cap(),
            process_whitelist: Vec::new(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

/// Resolved configuration the rest of the crate uses. Unlike
/// [`RawConfig`], severities are already validated enum values.
#[derive(Clone, Debug)]
pub struct Config {
    pub enable: bool,
    pub enforce: bool,
    pub min_log_severity: Severity,
    pub min_enforce_severity: Severity,
    pub log_path: PathBuf,
    pub ring_buffer_bytes: usize,
    pub process_table_cap: usize,
    pub process_whitelist: Vec<String>,
    pub poll_timeout_ms: u64,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_raw(raw)
    }

    pub fn default_config() -> Self {
        Self::from_raw(RawConfig::default()).expect("built-in defaults are always valid")
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.process_table_cap == 0 {
            return Err(ConfigError::ZeroProcessTableCap);
        }
        if !raw.ring_buffer_bytes.is_power_of_two() {
            return Err(ConfigError::RingBufferBytesNotPowerOfTwo);
        }
        Ok(Config {
            enable: raw.enable,
            enforce: raw.enforce,
            min_log_severity: Severity::from_str(&raw.min_log_severity)?,
            min_enforce_severity: Severity::from_str(&raw.min_enforce_severity)?,
            log_path: raw.log_path,
            ring_buffer_bytes: raw.ring_buffer_bytes,
            process_table_cap: raw.process_table_cap,
            process_whitelist: raw.process_whitelist,
            poll_timeout_ms: raw.poll_timeout_ms,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default_config();
        assert!(config.enable);
        assert!(!config.enforce);
        assert_eq!(config.min_log_severity, Severity::Info);
    }

    #[test]
    fn parses_a_minimal_toml_document() {
        let toml = r#"
            enforce = true
            min_enforce_severity = "high"
        "#;
        let raw: RawConfig = toml::from_str(toml).unwrap();
        let config = Config::from_raw(raw).unwrap();
        assert!(config.enforce);
        assert_eq!(config.min_enforce_severity, Severity::High);
    }

    #[test]
    fn rejects_unknown_severity() {
        let toml = r#"min_log_severity = "catastrophic""#;
        let raw: RawConfig = toml::from_str(toml).unwrap();
        assert!(matches!(Config::from_raw(raw), Err(ConfigError::InvalidSeverity(_))));
    }

    #[test]
    fn rejects_zero_process_table_cap() {
        let toml = r#"process_table_cap = 0"#;
        let raw: RawConfig = toml::from_str(toml).unwrap();
        assert!(matches!(Config::from_raw(raw), Err(ConfigError::ZeroProcessTableCap)));
    }
}
