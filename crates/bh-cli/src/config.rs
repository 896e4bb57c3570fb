//! Configuration loading and validation.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use bh_core::{CompilerOptions, DebugFlags, MatchLimits, MAX_DOMAIN_LEN};
use bh_gravity::EngineOptions;

use crate::error::{ConfigError, ValidationError};

/// Location of the configuration file when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/blackhole/blackhole.toml";

/// Upper bound accepted for `limits.max_input_len`.
const MAX_INPUT_LEN_CEILING: usize = 4096;

/// Main configuration for the Blackhole CLI.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// JSON rule database to load regex filters from.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Debug switches: "regex", "reload", "clients" or "all".
    #[serde(default)]
    pub debug: Vec<String>,

    #[serde(default)]
    pub limits: LimitSettings,
}

/// Matching and compile limits.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LimitSettings {
    /// Longer inputs are never matched.
    #[serde(default = "default_max_input_len")]
    pub max_input_len: usize,

    /// Upper bound on the compiled size of a single pattern, in bytes.
    #[serde(default = "default_regex_size_limit")]
    pub regex_size_limit: usize,

    #[serde(default = "default_regex_dfa_size_limit")]
    pub regex_dfa_size_limit: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_input_len: default_max_input_len(),
            regex_size_limit: default_regex_size_limit(),
            regex_dfa_size_limit: default_regex_dfa_size_limit(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            debug: Vec::new(),
            limits: LimitSettings::default(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("/etc/blackhole/gravity.json")
}

const fn default_max_input_len() -> usize {
    MAX_DOMAIN_LEN
}

fn default_regex_size_limit() -> usize {
    CompilerOptions::default().size_limit
}

fn default_regex_dfa_size_limit() -> usize {
    CompilerOptions::default().dfa_size_limit
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::ReadFile(err)),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.database.as_os_str().is_empty() {
            return Err(ValidationError::EmptyDatabasePath);
        }

        for name in &self.debug {
            if DebugFlags::from_config_name(name).is_none() {
                return Err(ValidationError::UnknownDebugFlag { name: name.clone() });
            }
        }

        if self.limits.max_input_len == 0 || self.limits.max_input_len > MAX_INPUT_LEN_CEILING {
            return Err(ValidationError::InputLimitOutOfRange {
                max: MAX_INPUT_LEN_CEILING,
            });
        }

        if self.limits.regex_size_limit == 0 {
            return Err(ValidationError::ZeroSizeLimit);
        }

        if self.limits.regex_dfa_size_limit == 0 {
            return Err(ValidationError::ZeroDfaSizeLimit);
        }

        Ok(())
    }

    /// Debug switches named in the file. Unknown names are ignored.
    pub fn debug_flags(&self) -> DebugFlags {
        self.debug
            .iter()
            .filter_map(|name| DebugFlags::from_config_name(name))
            .fold(DebugFlags::empty(), |acc, flag| acc | flag)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            compiler: CompilerOptions {
                size_limit: self.limits.regex_size_limit,
                dfa_size_limit: self.limits.regex_dfa_size_limit,
            },
            limits: MatchLimits {
                max_input_len: self.limits.max_input_len,
            },
            debug: self.debug_flags(),
        }
    }
}
