//! Configuration loading and config file resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line arguments (applied by the binary on top of the loaded file)
//! 2. TOML config file
//! 3. Compiled defaults
//!
//! A missing config file is never fatal: the pipeline starts with defaults and
//! logs a warning. A config file that exists but cannot be parsed is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "DCMSORT_CONFIG";

/// Directory name used under the platform config directory
const APP_DIR: &str = "dcmsort2nii";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Worker count (default: number of CPUs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Split 4D volumes into numbered 3D volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_4d: Option<bool>,

    /// Write error_log.csv when any step failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_log: Option<bool>,

    /// External volumetric converter invocation
    #[serde(default)]
    pub converter: ConverterSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// External converter settings
///
/// `args` is a template: `{input}` is replaced by the directory holding the
/// staged slice files, `{output}` by the directory the converter must write
/// exactly one volume into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterSettings {
    /// Converter executable (looked up on PATH when relative)
    #[serde(default = "default_converter_program")]
    pub program: PathBuf,

    /// Argument template
    #[serde(default = "default_converter_args")]
    pub args: Vec<String>,

    /// Kill the converter after this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Parent directory for conversion staging directories (system temp if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            program: default_converter_program(),
            args: default_converter_args(),
            timeout_secs: None,
            scratch_dir: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_converter_program() -> PathBuf {
    PathBuf::from("dcm2niix")
}

fn default_converter_args() -> Vec<String> {
    ["-z", "y", "-b", "n", "-f", "volume", "-o", "{output}", "{input}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default number of workers: one per logical CPU
pub fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

/// Locate the config file to load
///
/// Priority: explicit path → `DCMSORT_CONFIG` → user config dir → system config
/// (Linux only). Only the explicit path and the environment variable are
/// returned without checking existence, so that a typo surfaces as a warning
/// instead of silently falling through to another file.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml")) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR).join("config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load configuration with graceful degradation
///
/// Missing file → warning + defaults. Unparsable file → error.
pub fn load_or_default(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} does not exist, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let config = load_toml_config(&path)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write configuration to a TOML file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::Io(e));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.converter.program, PathBuf::from("dcm2niix"));
        assert!(config.converter.args.iter().any(|a| a == "{input}"));
        assert!(config.converter.args.iter().any(|a| a == "{output}"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_converter_section_keeps_default_args() {
        let config: TomlConfig = toml::from_str(
            r#"
            workers = 3
            [converter]
            program = "/opt/bin/dcm2niix"
            timeout_secs = 600
            "#,
        )
        .unwrap();

        assert_eq!(config.workers, Some(3));
        assert_eq!(config.converter.program, PathBuf::from("/opt/bin/dcm2niix"));
        assert_eq!(config.converter.timeout_secs, Some(600));
        assert_eq!(config.converter.args, default_converter_args());
    }

    #[test]
    fn test_default_worker_count_positive() {
        assert!(default_worker_count() >= 1);
    }
}
