use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::{api_error, region_qualified, require_credential};
use crate::credentials::CredentialSource;
use crate::diarize::DiarizedUnit;
use crate::error::SttError;
use crate::format::ContainerFormat;
use crate::provider::{
    ProviderTranscript, TranscribeFuture, TranscriptionProvider, TranscriptionRequest,
};

pub const DEFAULT_BASE_URL: &str = "https://speech.googleapis.com/v1p1beta1";

/// Bounds passed to Google's speaker diarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeakerRange {
    pub min: u32,
    pub max: u32,
}

impl Default for SpeakerRange {
    fn default() -> Self {
        Self { min: 1, max: 6 }
    }
}

/// Google Cloud Speech-to-Text `speech:recognize`, authenticated with an OAuth access token.
pub struct GoogleSpeechProvider {
    name: String,
    client: reqwest::Client,
    credential: Arc<dyn CredentialSource>,
    base_url: String,
    model: Option<String>,
    project_id: Option<String>,
    default_language: String,
    speakers: SpeakerRange,
}

impl GoogleSpeechProvider {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        client: reqwest::Client,
        credential: Arc<dyn CredentialSource>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            credential,
            base_url: base_url.into(),
            model: None,
            project_id: None,
            default_language: "en-US".into(),
            speakers: SpeakerRange::default(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Billing project sent as `x-goog-user-project`.
    #[must_use]
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    #[must_use]
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    #[must_use]
    pub fn with_speakers(mut self, speakers: SpeakerRange) -> Self {
        self.speakers = speakers;
        self
    }
}

impl std::fmt::Debug for GoogleSpeechProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSpeechProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("default_language", &self.default_language)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate_hertz: Option<u32>,
    language_code: String,
    enable_automatic_punctuation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diarization_config: Option<DiarizationConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DiarizationConfig {
    enable_speaker_diarization: bool,
    min_speaker_count: u32,
    max_speaker_count: u32,
}

#[derive(Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
    #[serde(default)]
    language_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Alternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    words: Vec<WordInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WordInfo {
    word: String,
    #[serde(default)]
    speaker_tag: Option<u32>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
}

/// Parse a protobuf JSON duration such as `"1.500s"`.
fn parse_offset(value: Option<&str>) -> Option<f32> {
    value?.strip_suffix('s')?.parse().ok()
}

impl WordInfo {
    fn into_unit(self) -> Option<DiarizedUnit> {
        let speaker = self.speaker_tag.filter(|t| *t > 0)?;
        let start = parse_offset(self.start_time.as_deref());
        let end = parse_offset(self.end_time.as_deref());
        let unit = DiarizedUnit::new(self.word, speaker);
        Some(match (start, end) {
            (Some(start), Some(end)) => unit.with_timing(start, end),
            _ => unit,
        })
    }
}

fn transcript_from(response: RecognizeResponse, diarize: bool) -> ProviderTranscript {
    let text = response
        .results
        .iter()
        .filter_map(|r| r.alternatives.first())
        .map(|a| a.transcript.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let confidence = response
        .results
        .iter()
        .find_map(|r| r.alternatives.first().and_then(|a| a.confidence));
    let language = response
        .results
        .iter()
        .find_map(|r| r.language_code.clone());
    // With diarization on, the last result repeats every word of the request with its speaker tag.
    let units = if diarize {
        response
            .results
            .into_iter()
            .last()
            .and_then(|r| r.alternatives.into_iter().next())
            .map(|a| {
                a.words
                    .into_iter()
                    .filter_map(WordInfo::into_unit)
                    .collect::<Vec<_>>()
            })
            .filter(|u| !u.is_empty())
    } else {
        None
    };
    ProviderTranscript {
        text,
        units,
        model: String::new(),
        confidence,
        language,
    }
}

impl TranscriptionProvider for GoogleSpeechProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_diarization(&self) -> bool {
        true
    }

    fn transcribe<'a>(&'a self, request: &'a TranscriptionRequest) -> TranscribeFuture<'a> {
        Box::pin(async move {
            let format = request.format();
            if format.container == ContainerFormat::Mp4 {
                return Err(SttError::UnsupportedFormat {
                    provider: self.name.clone(),
                    format: format.container.as_str(),
                });
            }
            let token = require_credential(&self.name, self.credential.as_ref())?;
            let diarize = request.enable_diarization;

            let language_code = region_qualified(
                request
                    .language_hint()
                    .unwrap_or(self.default_language.as_str()),
            );
            let body = RecognizeRequest {
                config: RecognitionConfig {
                    encoding: format.encoding.map(|e| e.encoding),
                    sample_rate_hertz: format.encoding.and_then(|e| e.sample_rate_hz),
                    language_code,
                    enable_automatic_punctuation: true,
                    model: self.model.as_deref(),
                    diarization_config: diarize.then_some(DiarizationConfig {
                        enable_speaker_diarization: true,
                        min_speaker_count: self.speakers.min,
                        max_speaker_count: self.speakers.max,
                    }),
                },
                audio: RecognitionAudio {
                    content: STANDARD.encode(request.audio()),
                },
            };

            let url = format!("{}/speech:recognize", self.base_url.trim_end_matches('/'));
            tracing::debug!(
                provider = %self.name,
                encoding = ?body.config.encoding,
                language = %body.config.language_code,
                diarize,
                duration_secs = ?request.duration_secs,
                "google speech request"
            );
            let mut req = self.client.post(&url).bearer_auth(&token).json(&body);
            if let Some(ref project) = self.project_id {
                req = req.header("x-goog-user-project", project);
            }
            let resp = req.send().await?;

            if !resp.status().is_success() {
                return Err(api_error(&self.name, resp).await);
            }

            let parsed: RecognizeResponse = serde_json::from_str(&resp.text().await?)?;
            let mut transcript = transcript_from(parsed, diarize);
            transcript.model = self.model.clone().unwrap_or_else(|| "default".into());
            transcript.ensure_non_empty(&self.name)
        })
    }
}
