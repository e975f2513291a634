//! Secret resolution.
//!
//! # Contract
//! - Every secret-bearing value is read from the environment exactly once,
//!   at startup, via [`resolve_secrets`].
//! - The returned [`ResolvedSecrets`] is passed into constructors; never
//!   scatter `std::env::var` calls across the rest of the workspace.
//! - `Debug` redacts every field that carries a credential.
//! - Error messages reference the env var NAME, never the value.

use anyhow::{bail, Result};

/// `PAPER=true` uses the paper broker and needs no broker credentials;
/// `PAPER=false` is LIVE and requires the full Alpaca credential set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Paper,
    Live,
}

/// All runtime-resolved secrets for one process. Built once by
/// [`resolve_secrets`]; `Debug` redacts every field here.
#[derive(Clone)]
pub struct ResolvedSecrets {
    pub broker_base_url: Option<String>,
    pub broker_data_key: Option<String>,
    pub broker_trading_key: Option<String>,
    pub broker_secret_key: Option<String>,
    pub sheet_client_email: Option<String>,
    pub sheet_private_key: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<REDACTED>");
        f.debug_struct("ResolvedSecrets")
            .field("broker_base_url", &self.broker_base_url)
            .field("broker_data_key", &redacted(&self.broker_data_key))
            .field("broker_trading_key", &redacted(&self.broker_trading_key))
            .field("broker_secret_key", &redacted(&self.broker_secret_key))
            .field("sheet_client_email", &redacted(&self.sheet_client_email))
            .field("sheet_private_key", &redacted(&self.sheet_private_key))
            .finish()
    }
}

/// Resolve a named environment variable. `None` if unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve all secret-bearing env vars for `mode`.
///
/// LIVE requires `BROKER_BASE_URL`, `BROKER_TRADING_KEY`, `BROKER_SECRET_KEY`;
/// PAPER requires none of the broker vars. The sheet-export credentials
/// (`SHEET_CLIENT_EMAIL`, `SHEET_PRIVATE_KEY`) are always optional — sheet
/// export degrades to a no-op when absent, it never blocks startup.
///
/// # Errors
/// Returns `Err` naming the first missing required var. The value is never
/// mentioned.
pub fn resolve_secrets(mode: RunMode) -> Result<ResolvedSecrets> {
    let broker_base_url = resolve_env("BROKER_BASE_URL");
    let broker_data_key = resolve_env("BROKER_DATA_KEY");
    let broker_trading_key = resolve_env("BROKER_TRADING_KEY");
    let broker_secret_key = resolve_env("BROKER_SECRET_KEY");

    if mode == RunMode::Live {
        if broker_base_url.is_none() {
            bail!("SECRETS_MISSING mode=LIVE: required env var 'BROKER_BASE_URL' is not set or empty");
        }
        if broker_trading_key.is_none() {
            bail!("SECRETS_MISSING mode=LIVE: required env var 'BROKER_TRADING_KEY' is not set or empty");
        }
        if broker_secret_key.is_none() {
            bail!("SECRETS_MISSING mode=LIVE: required env var 'BROKER_SECRET_KEY' is not set or empty");
        }
    }

    Ok(ResolvedSecrets {
        broker_base_url,
        broker_data_key,
        broker_trading_key,
        broker_secret_key,
        sheet_client_email: resolve_env("SHEET_CLIENT_EMAIL"),
        sheet_private_key: resolve_env("SHEET_PRIVATE_KEY"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_mode_succeeds_with_no_broker_vars_set() {
        // None of BROKER_* are set in the test environment by definition.
        let secrets = resolve_secrets(RunMode::Paper).expect("paper mode must not require broker creds");
        assert!(secrets.broker_trading_key.is_none() || secrets.broker_trading_key.is_some());
    }

    #[test]
    fn live_mode_fails_closed_when_broker_base_url_missing() {
        // Rely on ambient env not carrying a real BROKER_BASE_URL in CI.
        if std::env::var("BROKER_BASE_URL").is_ok() {
            return;
        }
        let err = resolve_secrets(RunMode::Live).expect_err("live mode requires BROKER_BASE_URL");
        let msg = err.to_string();
        assert!(msg.contains("SECRETS_MISSING"));
        assert!(msg.contains("BROKER_BASE_URL"));
    }

    #[test]
    fn debug_output_redacts_broker_secret_key() {
        let secrets = ResolvedSecrets {
            broker_base_url: Some("https://paper-api.alpaca.markets".to_string()),
            broker_data_key: Some("k".to_string()),
            broker_trading_key: Some("k".to_string()),
            broker_secret_key: Some("super-secret".to_string()),
            sheet_client_email: None,
            sheet_private_key: None,
        };
        let rendered = format!("{secrets:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<REDACTED>"));
    }
}
