use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diarize::LabelMode;
use crate::error::SttError;
use crate::provider::TranscriptionProvider;

/// The calling context that selects a provider chain and diarization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Single speaker at a microphone.
    Microphone,
    /// System or mixed audio, possibly several speakers.
    SystemAudio,
}

impl Scenario {
    pub const ALL: [Self; 2] = [Self::Microphone, Self::SystemAudio];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Microphone => "microphone",
            Self::SystemAudio => "system_audio",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = SttError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "microphone" | "mic" => Ok(Self::Microphone),
            "system_audio" | "system-audio" | "system" | "mixed" => Ok(Self::SystemAudio),
            other => Err(SttError::Registry(format!("unknown scenario '{other}'"))),
        }
    }
}

/// Diarization behavior applied to every attempt in a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScenarioPolicy {
    pub diarization: bool,
    pub label_mode: LabelMode,
}

impl ScenarioPolicy {
    #[must_use]
    pub fn default_for(scenario: Scenario) -> Self {
        match scenario {
            Scenario::Microphone => Self {
                diarization: false,
                label_mode: LabelMode::Labeled,
            },
            Scenario::SystemAudio => Self {
                diarization: true,
                label_mode: LabelMode::Unlabeled,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub scenarios: Vec<Scenario>,
    pub diarization: bool,
    /// Lower runs earlier.
    pub priority: u32,
}

impl ProviderDescriptor {
    #[must_use]
    pub fn applies_to(&self, scenario: Scenario) -> bool {
        self.scenarios.contains(&scenario)
    }
}

pub struct ProviderEntry {
    pub descriptor: ProviderDescriptor,
    pub provider: Arc<dyn TranscriptionProvider>,
}

impl ProviderEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Immutable-after-startup set of providers and their scenario applicability.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    entries: Vec<ProviderEntry>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider.
    ///
    /// # Errors
    ///
    /// Returns [`SttError::Registry`] if the name is already registered or no scenario is given.
    pub fn register(
        &mut self,
        provider: Arc<dyn TranscriptionProvider>,
        priority: u32,
        scenarios: &[Scenario],
    ) -> Result<&mut Self, SttError> {
        let name = provider.name().to_owned();
        if self.get(&name).is_some() {
            return Err(SttError::Registry(format!(
                "provider '{name}' registered twice"
            )));
        }
        if scenarios.is_empty() {
            return Err(SttError::Registry(format!(
                "provider '{name}' applies to no scenario"
            )));
        }
        let mut scenarios = scenarios.to_vec();
        scenarios.dedup();
        self.entries.push(ProviderEntry {
            descriptor: ProviderDescriptor {
                name,
                scenarios,
                diarization: provider.supports_diarization(),
                priority,
            },
            provider,
        });
        Ok(self)
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn with(
        mut self,
        provider: Arc<dyn TranscriptionProvider>,
        priority: u32,
        scenarios: &[Scenario],
    ) -> Result<Self, SttError> {
        self.register(provider, priority, scenarios)?;
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProviderEntry> {
        self.entries.iter().find(|e| e.name() == name)
    }

    #[must_use]
    pub fn entries(&self) -> &[ProviderEntry] {
        &self.entries
    }

    /// Ordered attempt chain for `scenario`.
    ///
    /// Providers are ordered by priority, ties by registration order. When the policy
    /// diarizes, diarization-capable providers come first.
    #[must_use]
    pub fn chain(&self, scenario: Scenario, policy: &ScenarioPolicy) -> Vec<&ProviderEntry> {
        let mut chain: Vec<&ProviderEntry> = self
            .entries
            .iter()
            .filter(|e| e.descriptor.applies_to(scenario))
            .collect();
        chain.sort_by_key(|e| {
            let diarization_rank = u8::from(policy.diarization && !e.descriptor.diarization);
            (diarization_rank, e.descriptor.priority)
        });
        chain
    }
}
