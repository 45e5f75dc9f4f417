use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use vela_stt::diarize::LabelMode;
use vela_stt::{Scenario, ScenarioPolicy};

use crate::vault::Secret;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SttConfig {
    /// Seconds a quota-exhausted provider is skipped before it is probed again.
    #[serde(default = "default_recheck_interval_secs")]
    pub recheck_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Used by region-qualified providers when a request carries no hint.
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default)]
    pub microphone: ScenarioConfig,
    #[serde(default)]
    pub system_audio: ScenarioConfig,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

fn default_recheck_interval_secs() -> u64 {
    3600
}

fn default_request_timeout_secs() -> u64 {
    300
}

pub(crate) fn default_language() -> String {
    "en-US".into()
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            recheck_interval_secs: default_recheck_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            default_language: default_language(),
            microphone: ScenarioConfig::default(),
            system_audio: ScenarioConfig::default(),
            providers: default_providers(),
        }
    }
}

impl SttConfig {
    /// Effective policy for `scenario`: configured fields over the scenario default.
    #[must_use]
    pub fn policy(&self, scenario: Scenario) -> ScenarioPolicy {
        let base = ScenarioPolicy::default_for(scenario);
        let overrides = match scenario {
            Scenario::Microphone => &self.microphone,
            Scenario::SystemAudio => &self.system_audio,
        };
        ScenarioPolicy {
            diarization: overrides.diarization.unwrap_or(base.diarization),
            label_mode: overrides.label_mode.unwrap_or(base.label_mode),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScenarioConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diarization: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_mode: Option<LabelMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible `/audio/transcriptions`.
    Whisper,
    Deepgram,
    Google,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<Scenario>,
    /// Whisper only; Deepgram and Google always diarize.
    #[serde(default)]
    pub diarization: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_speakers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_speakers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Google only: file holding an access token kept fresh by an external refresher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<String>,
}

fn default_priority() -> u32 {
    100
}

fn default_scenarios() -> Vec<Scenario> {
    Scenario::ALL.to_vec()
}

impl ProviderConfig {
    #[must_use]
    pub fn new(name: &str, kind: ProviderKind, priority: u32) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            base_url: None,
            model: None,
            priority,
            scenarios: default_scenarios(),
            diarization: false,
            min_speakers: None,
            max_speakers: None,
            project_id: None,
            token_file: None,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(match self.kind {
            ProviderKind::Whisper => "https://api.openai.com/v1",
            ProviderKind::Deepgram => "https://api.deepgram.com/v1",
            ProviderKind::Google => vela_stt::providers::GOOGLE_DEFAULT_BASE_URL,
        })
    }

    /// Configured model, or the backend's usual default. Google has none.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref().or(match self.kind {
            ProviderKind::Whisper => Some("whisper-1"),
            ProviderKind::Deepgram => Some("nova-2"),
            ProviderKind::Google => None,
        })
    }

    /// Vault key holding this provider's API key or bearer token.
    #[must_use]
    pub fn secret_key(&self) -> String {
        format!(
            "VELA_{}_API_KEY",
            self.name.to_ascii_uppercase().replace(['-', ' '], "_")
        )
    }
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            base_url: Some("https://space.ai-builders.com/backend/v1".into()),
            ..ProviderConfig::new("ai_builder", ProviderKind::Whisper, 10)
        },
        ProviderConfig::new("openai", ProviderKind::Whisper, 20),
        ProviderConfig::new("google", ProviderKind::Google, 30),
    ]
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VaultConfig {
    #[serde(default = "default_vault_backend")]
    pub backend: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            backend: default_vault_backend(),
        }
    }
}

fn default_vault_backend() -> String {
    "env".into()
}

#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    /// Provider name to resolved API key.
    pub api_keys: HashMap<String, Secret>,
}
