mod env;
mod types;


pub use types::*;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, bail};
use vela_stt::Scenario;

use crate::vault::VaultProvider;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Resolve each provider's API key through the vault as `VELA_{NAME}_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        for provider in &self.stt.providers {
            let key = provider.secret_key();
            if let Some(secret) = vault.lookup(&key).await? {
                self.secrets
                    .api_keys
                    .insert(provider.name.clone(), secret);
            } else {
                tracing::debug!(provider = %provider.name, key = %key, "no API key in vault");
            }
        }
        Ok(())
    }

    /// Reject configurations the executor cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first problem found.
    pub fn validate(&self) -> anyhow::Result<()> {
        let stt = &self.stt;
        if stt.providers.is_empty() {
            bail!("stt.providers must list at least one provider");
        }
        if stt.recheck_interval_secs == 0 {
            bail!("stt.recheck_interval_secs must be greater than zero");
        }
        if stt.request_timeout_secs == 0 {
            bail!("stt.request_timeout_secs must be greater than zero");
        }
        let mut seen = HashSet::new();
        for p in &stt.providers {
            if p.name.trim().is_empty() {
                bail!("stt.providers entry with empty name");
            }
            if !seen.insert(p.name.as_str()) {
                bail!("duplicate provider name '{}'", p.name);
            }
            if p.scenarios.is_empty() {
                bail!("provider '{}' applies to no scenario", p.name);
            }
            if let (Some(min), Some(max)) = (p.min_speakers, p.max_speakers)
                && min > max
            {
                bail!(
                    "provider '{}': min_speakers ({min}) exceeds max_speakers ({max})",
                    p.name
                );
            }
        }
        for scenario in Scenario::ALL {
            if !stt.providers.iter().any(|p| p.scenarios.contains(&scenario)) {
                bail!("no provider configured for scenario '{scenario}'");
            }
        }
        Ok(())
    }
}
