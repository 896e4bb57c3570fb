//! Error types for the Blackhole CLI.

use std::io;

use thiserror::Error;

use bh_core::CompileError;
use bh_gravity::StoreError;

/// Errors that abort a CLI command. Every variant maps to exit status 1.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("regex filter \"{}\" could not be compiled", .0.pattern())]
    CompileFailed(#[from] CompileError),

    #[error("domain is {len} bytes long, the limit is {max} bytes")]
    InputTooLong { len: usize, max: usize },

    #[error("rule database error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("database path cannot be empty")]
    EmptyDatabasePath,

    #[error("unknown debug flag: {name:?}")]
    UnknownDebugFlag { name: String },

    #[error("limits.max_input_len must be between 1 and {max}")]
    InputLimitOutOfRange { max: usize },

    #[error("limits.regex_size_limit must be greater than 0")]
    ZeroSizeLimit,

    #[error("limits.regex_dfa_size_limit must be greater than 0")]
    ZeroDfaSizeLimit,
}

/// Result type alias using [`HarnessError`].
pub type Result<T> = std::result::Result<T, HarnessError>;
