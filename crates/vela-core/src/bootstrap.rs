//! Application bootstrap: config resolution, vault, provider and executor construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use vela_stt::credentials::{CredentialSource, StaticCredential};
use vela_stt::http::transcription_client;
use vela_stt::providers::{DeepgramProvider, GoogleSpeechProvider, SpeakerRange, WhisperProvider};
use vela_stt::{FallbackExecutor, ProviderRegistry, Scenario, TranscriptionProvider};

use crate::config::{Config, ProviderConfig, ProviderKind};
use crate::credentials::TokenFileCredential;
use crate::vault::{EnvVaultProvider, VaultProvider};

/// Priority: explicit path > `VELA_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("VELA_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

/// Vault backend named in the config.
///
/// # Errors
///
/// Returns an error for an unknown backend name.
pub fn create_vault(config: &Config) -> anyhow::Result<Box<dyn VaultProvider>> {
    match config.vault.backend.as_str() {
        "env" => Ok(Box::new(EnvVaultProvider)),
        other => bail!("unknown vault backend: {other}"),
    }
}

/// Load, validate, and resolve secrets for the config at `path`.
///
/// # Errors
///
/// Returns an error if the config cannot be parsed, is invalid, or the vault fails.
pub async fn load_config(path: &Path) -> anyhow::Result<Config> {
    let mut config = Config::load(path)?;
    config.validate()?;
    let vault = create_vault(&config)?;
    config.resolve_secrets(vault.as_ref()).await?;
    Ok(config)
}

fn credential_for(config: &Config, entry: &ProviderConfig) -> Arc<dyn CredentialSource> {
    if entry.kind == ProviderKind::Google
        && let Some(ref token_file) = entry.token_file
    {
        return Arc::new(TokenFileCredential::new(token_file));
    }
    let key = config
        .secrets
        .api_keys
        .get(&entry.name)
        .map(|s| s.expose().to_owned());
    if key.is_none() {
        tracing::warn!(
            provider = %entry.name,
            key = %entry.secret_key(),
            "no credential configured, provider will fail until one is set"
        );
    }
    Arc::new(StaticCredential::from(key))
}

fn create_provider(
    config: &Config,
    entry: &ProviderConfig,
    client: &reqwest::Client,
) -> Arc<dyn TranscriptionProvider> {
    let credential = credential_for(config, entry);
    match entry.kind {
        ProviderKind::Whisper => Arc::new(
            WhisperProvider::new(
                &entry.name,
                client.clone(),
                credential,
                entry.base_url(),
                entry.model().unwrap_or("whisper-1"),
            )
            .with_diarization(entry.diarization),
        ),
        ProviderKind::Deepgram => Arc::new(DeepgramProvider::new(
            &entry.name,
            client.clone(),
            credential,
            entry.base_url(),
            entry.model().unwrap_or("nova-2"),
        )),
        ProviderKind::Google => {
            let defaults = SpeakerRange::default();
            let mut google =
                GoogleSpeechProvider::new(&entry.name, client.clone(), credential, entry.base_url())
                    .with_default_language(&config.stt.default_language)
                    .with_speakers(SpeakerRange {
                        min: entry.min_speakers.unwrap_or(defaults.min),
                        max: entry.max_speakers.unwrap_or(defaults.max),
                    });
            if let Some(model) = entry.model() {
                google = google.with_model(model);
            }
            if let Some(ref project) = entry.project_id {
                google = google.with_project(project);
            }
            Arc::new(google)
        }
    }
}

/// Registry of every configured provider, sharing one HTTP client.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or a provider is registered twice.
pub fn build_registry(config: &Config) -> anyhow::Result<ProviderRegistry> {
    let client = transcription_client(Duration::from_secs(config.stt.request_timeout_secs))
        .context("failed to build HTTP client")?;
    let mut registry = ProviderRegistry::new();
    for entry in &config.stt.providers {
        let provider = create_provider(config, entry, &client);
        registry
            .register(provider, entry.priority, &entry.scenarios)
            .with_context(|| format!("failed to register provider '{}'", entry.name))?;
        tracing::debug!(
            provider = %entry.name,
            kind = ?entry.kind,
            priority = entry.priority,
            "registered transcription provider"
        );
    }
    Ok(registry)
}

/// Executor with the configured providers, recheck interval, and scenario policies.
///
/// # Errors
///
/// Returns an error if the registry cannot be built or a scenario has no provider.
pub fn build_executor(config: &Config) -> anyhow::Result<FallbackExecutor> {
    let registry = build_registry(config)?;
    let mut executor =
        FallbackExecutor::new(registry, Duration::from_secs(config.stt.recheck_interval_secs))
            .context("failed to build fallback executor")?;
    for scenario in Scenario::ALL {
        executor = executor.with_policy(scenario, config.stt.policy(scenario));
        tracing::info!(
            %scenario,
            chain = ?executor.chain_names(scenario),
            "transcription chain"
        );
    }
    Ok(executor)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::vault::Secret;

    #[test]
    #[serial]
    fn config_path_priority() {
        unsafe { std::env::remove_var("VELA_CONFIG") };
        assert_eq!(
            resolve_config_path(None),
            PathBuf::from("config/default.toml")
        );

        unsafe { std::env::set_var("VELA_CONFIG", "/etc/vela.toml") };
        assert_eq!(resolve_config_path(None), PathBuf::from("/etc/vela.toml"));
        assert_eq!(
            resolve_config_path(Some(Path::new("local.toml"))),
            PathBuf::from("local.toml")
        );
        unsafe { std::env::remove_var("VELA_CONFIG") };
    }

    #[test]
    fn unknown_vault_backend_rejected() {
        let mut config = Config::default();
        config.vault.backend = "age".into();
        assert!(create_vault(&config).is_err());
    }

    #[test]
    fn default_config_builds_chains() {
        let mut config = Config::default();
        config
            .secrets
            .api_keys
            .insert("openai".into(), Secret::new("sk-test"));
        let executor = build_executor(&config).unwrap();
        assert_eq!(
            executor.chain_names(Scenario::Microphone),
            ["ai_builder", "openai", "google"]
        );
        assert_eq!(
            executor.chain_names(Scenario::SystemAudio),
            ["google", "ai_builder", "openai"]
        );
        let status = executor.status();
        assert_eq!(status.providers.len(), 3);
        assert!(status.providers.iter().all(|p| p.available));
    }

    #[test]
    fn whisper_diarization_flag_reaches_registry() {
        let mut config = Config::default();
        config.stt.providers[1].diarization = true;
        let registry = build_registry(&config).unwrap();
        assert!(registry.get("openai").unwrap().descriptor.diarization);
        assert!(!registry.get("ai_builder").unwrap().descriptor.diarization);
    }

    #[tokio::test]
    #[serial]
    async fn load_config_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[stt]\nrecheck_interval_secs = 0\n").unwrap();
        let err = load_config(&path).await.unwrap_err();
        assert!(err.to_string().contains("recheck_interval_secs"));
    }
}
