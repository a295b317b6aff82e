//! TOML configuration loader with validation.
//!
//! Parse, then validate; either failure is fatal at start-up and carries a
//! diagnostic. Configuration never changes after start-up.

use std::path::Path;

use ccs_common::config::SupervisorConfig;

/// Configuration loading/validation error.
#[derive(Debug)]
pub enum ConfigError {
    /// File I/O error.
    IoError(String),
    /// TOML parse error (includes unknown options).
    ParseError(String),
    /// Parameter validation error.
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "config I/O error: {e}"),
            Self::ParseError(e) => write!(f, "config parse error: {e}"),
            Self::ValidationError(e) => write!(f, "config validation: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate the supervisor configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<SupervisorConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(format!("failed to read {}: {e}", path.display())))?;
    load_config_from_str(&text)
}

/// Load config from a TOML string (tests and embedded defaults).
pub fn load_config_from_str(text: &str) -> Result<SupervisorConfig, ConfigError> {
    let cfg: SupervisorConfig =
        toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    cfg.validate().map_err(ConfigError::ValidationError)?;
    Ok(cfg)
}

// ─── Tests ──────────────────────────────────────────────────────────
