//! Speech-to-text fallback orchestration: provider adapters, quota-aware health
//! tracking, error classification, and diarization formatting.

pub mod classifier;
pub mod credentials;
pub mod diarize;
pub mod error;
pub mod executor;
pub mod format;
pub mod health;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod usage;

pub use classifier::ErrorClass;
pub use error::SttError;
pub use executor::{FallbackExecutor, StatusReport, TranscriptionEvent, TranscriptionResult};
pub use provider::{TranscriptionProvider, TranscriptionRequest};
pub use registry::{ProviderRegistry, Scenario, ScenarioPolicy};
