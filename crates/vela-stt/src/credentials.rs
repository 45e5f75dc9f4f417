//! Synchronous access to provider credentials.
//!
//! Acquisition and refresh happen elsewhere; adapters only ask for the value that
//! is current at call time.

use std::fmt;

/// Source of the secret or bearer token an adapter authenticates with.
pub trait CredentialSource: Send + Sync {
    /// The credential valid right now, or `None` when the provider is not configured.
    fn current(&self) -> Option<String>;
}

/// A credential resolved once at startup.
#[derive(Clone, Default)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self((!value.trim().is_empty()).then_some(value))
    }

    #[must_use]
    pub fn missing() -> Self {
        Self(None)
    }
}

impl From<Option<String>> for StaticCredential {
    fn from(value: Option<String>) -> Self {
        value.map_or_else(Self::missing, Self::new)
    }
}

impl fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("StaticCredential([REDACTED])"),
            None => f.write_str("StaticCredential(None)"),
        }
    }
}

impl CredentialSource for StaticCredential {
    fn current(&self) -> Option<String> {
        self.0.clone()
    }
}
