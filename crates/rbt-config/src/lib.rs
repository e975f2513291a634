//! Runtime configuration: all of it comes from environment variables,
//! resolved once at startup into a [`RuntimeConfig`] and handed to the
//! orchestrator's constructors rather than read ad hoc.

pub mod secrets;

pub use secrets::{resolve_secrets, ResolvedSecrets, RunMode};

use thiserror::Error;

/// Fails fast at startup when a required variable is
/// missing or malformed — distinct from the broker/reconcile/internal
/// failure paths, which return a plain `anyhow::Error`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

#[derive(Debug)]
pub struct RuntimeConfig {
    pub mode: RunMode,
    pub secrets: ResolvedSecrets,
    pub data_feed: String,
    pub db_path: String,
    pub log_level: String,
    pub sheet_id: Option<String>,
}

/// Reads `PAPER`, `DATA_FEED`, `DB_PATH`, `LOG_LEVEL`, `SHEET_ID`, then
/// resolves the mode-dependent secret set.
pub fn load_from_env() -> Result<RuntimeConfig, ConfigError> {
    let mode = match std::env::var("PAPER").as_deref() {
        Ok("false") => RunMode::Live,
        Ok("true") | Err(_) => RunMode::Paper,
        Ok(other) => return Err(ConfigError(format!("PAPER must be 'true' or 'false', got '{other}'"))),
    };

    let db_path = std::env::var("DB_PATH").map_err(|_| ConfigError("missing required env var 'DB_PATH'".to_string()))?;

    let secrets = resolve_secrets(mode).map_err(|e| ConfigError(e.to_string()))?;

    Ok(RuntimeConfig {
        mode,
        secrets,
        data_feed: std::env::var("DATA_FEED").unwrap_or_else(|_| "iex".to_string()),
        db_path,
        log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        sheet_id: std::env::var("SHEET_ID").ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_db_path_is_a_config_error() {
        if std::env::var("DB_PATH").is_ok() {
            return;
        }
        let err = load_from_env().expect_err("DB_PATH must be required");
        assert!(err.0.contains("DB_PATH"));
    }

    #[test]
    fn unrecognized_paper_value_is_rejected() {
        std::env::set_var("PAPER", "yes-please");
        std::env::set_var("DB_PATH", "/tmp/rbt-config-test.db");
        let result = load_from_env();
        std::env::remove_var("PAPER");
        std::env::remove_var("DB_PATH");
        let err = result.expect_err("non-boolean PAPER must fail");
        assert!(err.0.contains("PAPER"));
    }
}
