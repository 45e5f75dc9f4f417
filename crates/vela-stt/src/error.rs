use crate::classifier::{self, ErrorClass};
use crate::executor::AttemptFailure;
use crate::registry::Scenario;

#[derive(Debug, thiserror::Error)]
pub enum SttError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{provider} API error [{status}]: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("empty transcript from {provider}")]
    EmptyTranscript { provider: String },

    #[error("{provider} not configured: no credential available")]
    NotConfigured { provider: String },

    #[error("{provider} cannot accept {format} audio")]
    UnsupportedFormat {
        provider: String,
        format: &'static str,
    },

    #[error("{provider} does not support diarization")]
    DiarizationUnsupported { provider: String },

    #[error("provider registry: {0}")]
    Registry(String),

    #[error("no providers configured for {0}")]
    NoProviders(Scenario),

    #[error("{0}")]
    Other(String),

    #[error("all transcription providers failed: {}", join_failures(.failures))]
    AllProvidersFailed {
        scenario: Scenario,
        failures: Vec<AttemptFailure>,
    },
}

fn join_failures(failures: &[AttemptFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

impl SttError {
    /// HTTP status associated with this failure, if the provider returned one.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Classify this failure for the fallback executor.
    ///
    /// Transport timeouts and connect failures are transient without consulting the
    /// keyword table; configuration and capability mismatches are always permanent.
    /// The keyword table only ever sees text the provider produced, never the
    /// configured provider name or request URL.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Http(e) if e.is_timeout() || e.is_connect() => ErrorClass::Transient,
            Self::Http(e) => classifier::classify(self.status_code(), &http_message(e)),
            Self::Api {
                status, message, ..
            } => classifier::classify(Some(*status), message),
            Self::Json(e) => classifier::classify(None, &e.to_string()),
            Self::Other(message) => classifier::classify(None, message),
            Self::NotConfigured { .. }
            | Self::UnsupportedFormat { .. }
            | Self::DiarizationUnsupported { .. }
            | Self::EmptyTranscript { .. }
            | Self::Registry(_)
            | Self::NoProviders(_)
            | Self::AllProvidersFailed { .. } => ErrorClass::Permanent,
        }
    }
}

/// Transport error text with the request URL removed, followed by its source chain.
fn http_message(e: &reqwest::Error) -> String {
    let mut message = e.to_string();
    if let Some(url) = e.url() {
        message = message.replace(url.as_str(), "");
    }
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    message
}
