mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use serde::Serialize;
use tokio::task::JoinSet;
use vela_core::bootstrap::{build_executor, load_config, resolve_config_path};
use vela_stt::{FallbackExecutor, Scenario, TranscriptionRequest, TranscriptionResult};

use crate::cli::{Cli, Commands, TranscribeArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    match cli.command {
        Commands::Transcribe(args) => {
            let executor = load_executor(cli.config.as_deref()).await?;
            transcribe_files(executor, args).await
        }
        Commands::Detect { files } => detect_files(&files).await,
        Commands::Status => {
            let executor = load_executor(cli.config.as_deref()).await?;
            print_status(&executor)
        }
    }
}

/// Logs go to stderr so transcripts on stdout stay pipeable.
fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_executor(config: Option<&Path>) -> anyhow::Result<Arc<FallbackExecutor>> {
    let config_path = resolve_config_path(config);
    tracing::debug!(path = %config_path.display(), "loading config");
    let config = load_config(&config_path)
        .await
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    Ok(Arc::new(build_executor(&config)?))
}

#[derive(Serialize)]
struct FileOutcome {
    file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<TranscriptionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Clone)]
struct RequestHints {
    language: Option<String>,
    duration: Option<f32>,
    diarize: bool,
}

async fn transcribe_one(
    executor: &FallbackExecutor,
    path: &Path,
    scenario: Scenario,
    hints: &RequestHints,
) -> anyhow::Result<TranscriptionResult> {
    let audio = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map_or_else(|| "audio".to_owned(), |n| n.to_string_lossy().into_owned());
    let mut request = TranscriptionRequest::new(audio, filename).with_diarization(hints.diarize);
    if let Some(ref language) = hints.language {
        request = request.with_language(language.clone());
    }
    if let Some(secs) = hints.duration {
        request = request.with_duration(secs);
    }
    Ok(executor.transcribe(&request, scenario).await?)
}

async fn transcribe_files(
    executor: Arc<FallbackExecutor>,
    args: TranscribeArgs,
) -> anyhow::Result<()> {
    let hints = RequestHints {
        language: args.language.clone(),
        duration: args.duration,
        diarize: args.diarize,
    };
    let mut tasks = JoinSet::new();
    for (index, path) in args.files.iter().cloned().enumerate() {
        let executor = Arc::clone(&executor);
        let hints = hints.clone();
        let scenario = args.scenario;
        tasks.spawn(async move {
            let outcome = transcribe_one(&executor, &path, scenario, &hints).await;
            (index, path, outcome)
        });
    }

    let mut outcomes: Vec<Option<FileOutcome>> = Vec::new();
    outcomes.resize_with(args.files.len(), || None);
    while let Some(joined) = tasks.join_next().await {
        let (index, file, outcome) = joined.context("transcription task panicked")?;
        let outcome = match outcome {
            Ok(result) => FileOutcome {
                file,
                result: Some(result),
                error: None,
            },
            Err(e) => {
                let message = format!("{e:#}");
                tracing::error!(file = %file.display(), error = %message, "transcription failed");
                FileOutcome {
                    file,
                    result: None,
                    error: Some(message),
                }
            }
        };
        outcomes[index] = Some(outcome);
    }
    let outcomes: Vec<FileOutcome> = outcomes.into_iter().flatten().collect();
    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        let many = outcomes.len() > 1;
        for outcome in &outcomes {
            if let Some(ref result) = outcome.result {
                if many {
                    println!("== {} [{}] ==", outcome.file.display(), result.provider);
                }
                println!("{}", result.text);
            }
        }
    }
    if args.status {
        print_status(&executor)?;
    }
    if failed > 0 {
        bail!("{failed} of {} file(s) failed to transcribe", outcomes.len());
    }
    Ok(())
}

async fn detect_files(files: &[PathBuf]) -> anyhow::Result<()> {
    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path.to_string_lossy();
        let detected = vela_stt::format::detect(&bytes, &name);
        let encoding = detected.encoding.map_or_else(
            || "-".to_owned(),
            |e| match e.sample_rate_hz {
                Some(rate) => format!("{} @ {rate} Hz", e.encoding),
                None => e.encoding.to_owned(),
            },
        );
        let source = if detected.from_signature {
            "signature"
        } else {
            "extension"
        };
        println!(
            "{}\t{}\t{}\t{encoding}\t({source})",
            path.display(),
            detected.container,
            detected.mime_type()
        );
    }
    Ok(())
}

fn print_status(executor: &FallbackExecutor) -> anyhow::Result<()> {
    for scenario in Scenario::ALL {
        eprintln!(
            "{scenario}: {}",
            executor.chain_names(scenario).join(" -> ")
        );
    }
    println!("{}", serde_json::to_string_pretty(&executor.status())?);
    Ok(())
}
