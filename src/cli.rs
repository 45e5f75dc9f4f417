//! Command-line interface for vela.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vela_stt::Scenario;

/// Speech-to-text with health-tracked fallback across providers
#[derive(Parser, Debug)]
#[command(name = "vela", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (default: $VELA_CONFIG or config/default.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcribe audio files through the provider chain
    Transcribe(TranscribeArgs),
    /// Print the detected container and encoding of audio files
    Detect {
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },
    /// Print configured provider chains and provider health
    Status,
}

#[derive(Args, Debug)]
pub struct TranscribeArgs {
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Calling context: microphone or system-audio
    #[arg(long, short, default_value = "microphone")]
    pub scenario: Scenario,

    /// Language hint, e.g. en or en-US (default: provider auto-detect)
    #[arg(long, short, value_name = "LANG")]
    pub language: Option<String>,

    /// Recording duration hint in seconds
    #[arg(long, value_name = "SECONDS")]
    pub duration: Option<f32>,

    /// Request speaker diarization even when the scenario does not
    #[arg(long)]
    pub diarize: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the provider status report after transcribing
    #[arg(long)]
    pub status: bool,
}
