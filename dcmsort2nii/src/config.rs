//! Run settings resolution for dcmsort2nii
//!
//! Priority: command line → TOML file → compiled defaults.

use dcmsort_common::config::{default_worker_count, ConverterSettings, TomlConfig};
use std::path::PathBuf;
use tracing::debug;

/// Values given on the command line; `None` means "not given"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub workers: Option<usize>,
    pub split: Option<bool>,
    pub error_log: Option<bool>,
    pub converter_program: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub verbose: bool,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub workers: usize,
    pub split: bool,
    pub error_log: bool,
    pub converter: ConverterSettings,
    /// Tracing filter directive (`info`, `debug`, ...)
    pub log_level: String,
}

impl RunSettings {
    /// Merge command line and TOML values over the defaults
    pub fn resolve(cli: &CliOverrides, toml: &TomlConfig) -> Self {
        let workers = pick("workers", cli.workers, toml.workers).unwrap_or_else(default_worker_count);
        let split = pick("split", cli.split, toml.split_4d).unwrap_or(false);
        let error_log = pick("error_log", cli.error_log, toml.error_log).unwrap_or(false);

        let mut converter = toml.converter.clone();
        if let Some(program) = &cli.converter_program {
            converter.program = program.clone();
        }
        if let Some(timeout) = cli.timeout_secs {
            converter.timeout_secs = Some(timeout);
        }

        let log_level = if cli.verbose {
            "debug".to_string()
        } else {
            toml.logging.level.clone()
        };

        Self {
            workers: workers.max(1),
            split,
            error_log,
            converter,
            log_level,
        }
    }
}

fn pick<T: std::fmt::Debug + Copy>(name: &str, cli: Option<T>, toml: Option<T>) -> Option<T> {
    match (cli, toml) {
        (Some(value), _) => {
            debug!(setting = name, ?value, "Using command-line value");
            Some(value)
        }
        (None, Some(value)) => {
            debug!(setting = name, ?value, "Using TOML value");
            Some(value)
        }
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_given() {
        let settings = RunSettings::resolve(&CliOverrides::default(), &TomlConfig::default());
        assert_eq!(settings.workers, default_worker_count().max(1));
        assert!(!settings.split);
        assert!(!settings.error_log);
        assert_eq!(settings.converter, ConverterSettings::default());
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_cli_beats_toml() {
        let toml = TomlConfig {
            workers: Some(3),
            split_4d: Some(true),
            error_log: Some(true),
            ..Default::default()
        };
        let cli = CliOverrides {
            workers: Some(7),
            split: Some(false),
            converter_program: Some(PathBuf::from("/opt/dcm2niix")),
            timeout_secs: Some(30),
            verbose: true,
            ..Default::default()
        };

        let settings = RunSettings::resolve(&cli, &toml);
        assert_eq!(settings.workers, 7);
        assert!(!settings.split);
        assert!(settings.error_log);
        assert_eq!(settings.converter.program, PathBuf::from("/opt/dcm2niix"));
        assert_eq!(settings.converter.timeout_secs, Some(30));
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_zero_workers_clamped() {
        let cli = CliOverrides {
            workers: Some(0),
            ..Default::default()
        };
        assert_eq!(RunSettings::resolve(&cli, &TomlConfig::default()).workers, 1);
    }
}
