//! Provider API key lookup.
//!
//! Keys are looked up by the name `ProviderConfig::secret_key` derives
//! (`VELA_{NAME}_API_KEY`) and held as [`Secret`] so they never reach logs.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

/// A provider API key. Prints as `[REDACTED]`.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The raw key, for building the provider's auth header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

pub type SecretFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<Option<Secret>>> + Send + 'a>>;

/// Where provider API keys come from, selected by `[vault] backend`.
pub trait VaultProvider: Send + Sync {
    /// Key stored under `name`, or `None` when the provider has no key configured.
    fn lookup(&self, name: &str) -> SecretFuture<'_>;
}

/// `backend = "env"`: keys come from the process environment.
///
/// A variable that is set but blank counts as missing, so an exported-but-empty
/// `VELA_OPENAI_API_KEY` leaves that provider unconfigured instead of sending an
/// empty bearer token.
pub struct EnvVaultProvider;

impl VaultProvider for EnvVaultProvider {
    fn lookup(&self, name: &str) -> SecretFuture<'_> {
        let value = std::env::var(name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(Secret::new);
        Box::pin(async move { Ok(value) })
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MockVaultProvider {
    keys: std::collections::HashMap<String, String>,
}

#[cfg(test)]
impl MockVaultProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_key(mut self, name: &str, value: &str) -> Self {
        self.keys.insert(name.to_owned(), value.to_owned());
        self
    }
}

#[cfg(test)]
impl VaultProvider for MockVaultProvider {
    fn lookup(&self, name: &str) -> SecretFuture<'_> {
        let value = self.keys.get(name).map(Secret::new);
        Box::pin(async move { Ok(value) })
    }
}
