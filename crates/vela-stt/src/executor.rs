//! Ordered fallback across providers with quota-aware skipping.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::classifier::ErrorClass;
use crate::diarize;
use crate::error::SttError;
use crate::format::ContainerFormat;
use crate::health::{Admission, HealthTracker, Recovery};
use crate::provider::{ProviderTranscript, TranscriptionRequest};
use crate::registry::{ProviderEntry, ProviderRegistry, Scenario, ScenarioPolicy};
use crate::usage::UsageCounters;

pub type EventTx = mpsc::UnboundedSender<TranscriptionEvent>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TranscriptionEvent {
    AttemptStarted {
        provider: String,
        scenario: Scenario,
        diarization: bool,
    },
    Skipped {
        provider: String,
        retry_in_secs: u64,
    },
    Failed {
        provider: String,
        class: ErrorClass,
        message: String,
    },
    Succeeded {
        provider: String,
        latency_ms: u64,
    },
    Recovered {
        provider: String,
    },
    AllFailed {
        scenario: Scenario,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Skipped { retry_in_secs: u64 },
    Failed { class: ErrorClass, message: String },
}

/// A provider that did not produce the result, in chain order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptFailure {
    pub provider: String,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl AttemptFailure {
    #[must_use]
    pub fn failed(provider: &str, class: ErrorClass, message: String) -> Self {
        Self {
            provider: provider.to_owned(),
            outcome: AttemptOutcome::Failed { class, message },
        }
    }

    #[must_use]
    pub fn skipped(provider: &str, retry_in: Duration) -> Self {
        Self {
            provider: provider.to_owned(),
            outcome: AttemptOutcome::Skipped {
                retry_in_secs: retry_in.as_secs(),
            },
        }
    }

    #[must_use]
    pub fn class(&self) -> Option<ErrorClass> {
        match self.outcome {
            AttemptOutcome::Failed { class, .. } => Some(class),
            AttemptOutcome::Skipped { .. } => None,
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Failed { message, .. } => write!(f, "{}: {message}", self.provider),
            AttemptOutcome::Skipped { retry_in_secs } => write!(
                f,
                "{}: skipped (quota exhausted, next probe in {retry_in_secs}s)",
                self.provider
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionMetadata {
    pub model: String,
    pub confidence: Option<f32>,
    /// Set only when diarization was in effect for the successful attempt.
    pub speaker_count: Option<usize>,
    pub latency_ms: u64,
    pub language: Option<String>,
    pub format: ContainerFormat,
    pub diarized: bool,
    pub fallback: Vec<AttemptFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub provider: String,
    pub metadata: TranscriptionMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub priority: u32,
    pub scenarios: Vec<Scenario>,
    pub diarization: bool,
    pub available: bool,
    pub exhausted: bool,
    pub exhausted_at: Option<DateTime<Utc>>,
    pub retry_in_secs: Option<u64>,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub recheck_interval_secs: u64,
    pub last_successful_provider: Option<String>,
    pub providers: Vec<ProviderStatus>,
}

/// Runs a request through a scenario's provider chain until one succeeds.
///
/// Health and usage state live inside the executor; share it across tasks with `Arc`.
#[derive(Debug)]
pub struct FallbackExecutor {
    registry: ProviderRegistry,
    policies: HashMap<Scenario, ScenarioPolicy>,
    health: HealthTracker,
    usage: UsageCounters,
    event_tx: Option<EventTx>,
}

impl FallbackExecutor {
    /// # Errors
    ///
    /// Returns [`SttError::NoProviders`] if any scenario would have an empty chain.
    pub fn new(registry: ProviderRegistry, recheck_interval: Duration) -> Result<Self, SttError> {
        for scenario in Scenario::ALL {
            if !registry.entries().iter().any(|e| e.descriptor.applies_to(scenario)) {
                return Err(SttError::NoProviders(scenario));
            }
        }
        let health = HealthTracker::new(recheck_interval);
        for entry in registry.entries() {
            health.register(entry.name());
        }
        let policies = Scenario::ALL
            .into_iter()
            .map(|s| (s, ScenarioPolicy::default_for(s)))
            .collect();
        Ok(Self {
            registry,
            policies,
            health,
            usage: UsageCounters::new(),
            event_tx: None,
        })
    }

    #[must_use]
    pub fn with_policy(mut self, scenario: Scenario, policy: ScenarioPolicy) -> Self {
        self.policies.insert(scenario, policy);
        self
    }

    pub fn set_event_tx(&mut self, tx: EventTx) {
        self.event_tx = Some(tx);
    }

    #[must_use]
    pub fn policy(&self, scenario: Scenario) -> ScenarioPolicy {
        self.policies
            .get(&scenario)
            .copied()
            .unwrap_or_else(|| ScenarioPolicy::default_for(scenario))
    }

    #[must_use]
    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    #[must_use]
    pub fn usage(&self) -> &UsageCounters {
        &self.usage
    }

    /// Provider names in the order they would be tried for `scenario`.
    #[must_use]
    pub fn chain_names(&self, scenario: Scenario) -> Vec<String> {
        self.registry
            .chain(scenario, &self.policy(scenario))
            .into_iter()
            .map(|e| e.name().to_owned())
            .collect()
    }

    fn emit(&self, event: TranscriptionEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// The provider exhausted longest ago, when every provider in `chain` would be skipped.
    fn last_resort<'a>(&self, chain: &[&'a ProviderEntry]) -> Option<&'a str> {
        if chain.iter().any(|e| self.health.should_attempt(e.name())) {
            return None;
        }
        chain
            .iter()
            .copied()
            .max_by_key(|e| self.health.exhausted_for(e.name()).unwrap_or_default())
            .map(ProviderEntry::name)
    }

    /// Transcribe `request` with the first provider in the chain that succeeds.
    ///
    /// Each provider is tried at most once. Quota failures mark the provider exhausted;
    /// other failures only move on to the next provider.
    ///
    /// # Errors
    ///
    /// Returns [`SttError::AllProvidersFailed`] with every attempted and skipped provider
    /// when none succeeds, or [`SttError::NoProviders`] if the chain is empty.
    pub async fn transcribe(
        &self,
        request: &TranscriptionRequest,
        scenario: Scenario,
    ) -> Result<TranscriptionResult, SttError> {
        let policy = self.policy(scenario);
        let chain = self.registry.chain(scenario, &policy);
        if chain.is_empty() {
            return Err(SttError::NoProviders(scenario));
        }
        let last_resort = self.last_resort(&chain);
        let mut failures = Vec::new();

        for entry in chain {
            let name = entry.name();
            // Held across the call so concurrent requests skip while this one probes.
            let admission = self.health.begin_attempt(name);
            if admission.is_skip() && last_resort != Some(name) {
                let retry_in = self.health.snapshot(name).retry_in.unwrap_or_default();
                tracing::info!(
                    provider = name,
                    retry_in_secs = retry_in.as_secs(),
                    "skipping quota-exhausted provider"
                );
                self.emit(TranscriptionEvent::Skipped {
                    provider: name.to_owned(),
                    retry_in_secs: retry_in.as_secs(),
                });
                failures.push(AttemptFailure::skipped(name, retry_in));
                continue;
            }
            if last_resort == Some(name) {
                tracing::info!(provider = name, "all providers exhausted, probing oldest");
            } else if matches!(admission, Admission::Probe(_)) {
                tracing::info!(provider = name, "recheck interval elapsed, probing");
            }

            let diarize = (policy.diarization || request.enable_diarization)
                && entry.provider.supports_diarization();
            let attempt = request.clone().with_diarization(diarize);
            tracing::debug!(provider = name, %scenario, diarize, "transcription attempt");
            self.emit(TranscriptionEvent::AttemptStarted {
                provider: name.to_owned(),
                scenario,
                diarization: diarize,
            });

            let started = Instant::now();
            let outcome = entry
                .provider
                .transcribe(&attempt)
                .await
                .and_then(|t| t.ensure_non_empty(name))
                .and_then(|t| finish_text(name, t, diarize, &policy));
            let latency = started.elapsed();
            drop(admission);

            match outcome {
                Ok((text, transcript, speaker_count)) => {
                    return Ok(self.on_success(
                        name,
                        text,
                        transcript,
                        TranscriptionMetadataParts {
                            speaker_count,
                            latency,
                            format: request.format().container,
                            diarized: diarize,
                            fallback: failures,
                        },
                    ));
                }
                Err(e) => self.on_failure(name, &e, &mut failures),
            }
        }

        let err = SttError::AllProvidersFailed {
            scenario,
            failures,
        };
        tracing::error!(%scenario, error = %err, "transcription failed on every provider");
        self.emit(TranscriptionEvent::AllFailed {
            scenario,
            message: err.to_string(),
        });
        Err(err)
    }

    fn on_success(
        &self,
        name: &str,
        text: String,
        transcript: ProviderTranscript,
        parts: TranscriptionMetadataParts,
    ) -> TranscriptionResult {
        if self.health.record_success(name) == Recovery::Recovered {
            tracing::info!(provider = name, "provider recovered from quota exhaustion");
            self.emit(TranscriptionEvent::Recovered {
                provider: name.to_owned(),
            });
        }
        self.usage.record_success(name);
        let latency_ms = u64::try_from(parts.latency.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            provider = name,
            latency_ms,
            fallbacks = parts.fallback.len(),
            "transcription succeeded"
        );
        self.emit(TranscriptionEvent::Succeeded {
            provider: name.to_owned(),
            latency_ms,
        });
        TranscriptionResult {
            text,
            provider: name.to_owned(),
            metadata: TranscriptionMetadata {
                model: transcript.model,
                confidence: transcript.confidence,
                speaker_count: parts.speaker_count,
                latency_ms,
                language: transcript.language,
                format: parts.format,
                diarized: parts.diarized,
                fallback: parts.fallback,
            },
        }
    }

    fn on_failure(&self, name: &str, err: &SttError, failures: &mut Vec<AttemptFailure>) {
        let class = err.class();
        self.usage.record_failure(name);
        match class {
            ErrorClass::QuotaExceeded => {
                self.health.mark_exhausted(name);
                tracing::warn!(
                    provider = name,
                    error = %err,
                    recheck_secs = self.health.recheck_interval().as_secs(),
                    "quota exhausted, provider paused"
                );
            }
            ErrorClass::Transient => {
                tracing::warn!(provider = name, error = %err, "transient failure, falling back");
            }
            ErrorClass::Permanent => {
                tracing::warn!(provider = name, error = %err, "provider failed, falling back");
            }
        }
        self.emit(TranscriptionEvent::Failed {
            provider: name.to_owned(),
            class,
            message: err.to_string(),
        });
        failures.push(AttemptFailure::failed(name, class, err.to_string()));
    }

    /// Health and usage for every registered provider.
    #[must_use]
    pub fn status(&self) -> StatusReport {
        let providers = self
            .registry
            .entries()
            .iter()
            .map(|entry| {
                let name = entry.name();
                let health = self.health.snapshot(name);
                let usage = self.usage.get(name);
                ProviderStatus {
                    name: name.to_owned(),
                    priority: entry.descriptor.priority,
                    scenarios: entry.descriptor.scenarios.clone(),
                    diarization: entry.descriptor.diarization,
                    available: health.is_attemptable(),
                    exhausted: health.exhausted,
                    exhausted_at: health.exhausted_at,
                    retry_in_secs: health.retry_in.map(|d| d.as_secs()),
                    successes: usage.successes,
                    failures: usage.failures,
                }
            })
            .collect();
        StatusReport {
            recheck_interval_secs: self.health.recheck_interval().as_secs(),
            last_successful_provider: self.usage.last_successful(),
            providers,
        }
    }
}

struct TranscriptionMetadataParts {
    speaker_count: Option<usize>,
    latency: Duration,
    format: ContainerFormat,
    diarized: bool,
    fallback: Vec<AttemptFailure>,
}

/// Final transcript text for one successful attempt, plus the speaker count when diarized.
fn finish_text(
    provider: &str,
    transcript: ProviderTranscript,
    diarize: bool,
    policy: &ScenarioPolicy,
) -> Result<(String, ProviderTranscript, Option<usize>), SttError> {
    let (text, speakers) = if diarize {
        let units = transcript
            .units
            .as_deref()
            .filter(|u| u.iter().any(|w| !w.text.trim().is_empty()));
        (
            diarize::render(units, &transcript.text, policy.label_mode),
            units.map(diarize::speaker_count),
        )
    } else {
        (transcript.text.clone(), None)
    };
    if text.trim().is_empty() {
        return Err(SttError::EmptyTranscript {
            provider: provider.to_owned(),
        });
    }
    Ok((text, transcript, speakers))
}
