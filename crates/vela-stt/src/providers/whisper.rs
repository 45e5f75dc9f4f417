use std::sync::Arc;

use serde::Deserialize;

use super::{api_error, iso639_1, require_credential};
use crate::credentials::CredentialSource;
use crate::diarize::DiarizedUnit;
use crate::error::SttError;
use crate::provider::{
    ProviderTranscript, TranscribeFuture, TranscriptionProvider, TranscriptionRequest,
};

/// OpenAI-compatible `/audio/transcriptions` endpoint.
///
/// Serves both the hosted proxy and OpenAI itself; only the base URL, model and
/// credential differ.
pub struct WhisperProvider {
    name: String,
    client: reqwest::Client,
    credential: Arc<dyn CredentialSource>,
    base_url: String,
    model: String,
    diarization: bool,
}

impl WhisperProvider {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        client: reqwest::Client,
        credential: Arc<dyn CredentialSource>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            credential,
            base_url: base_url.into(),
            model: model.into(),
            diarization: false,
        }
    }

    /// Request `diarized_json` output when diarization is in effect. Only some models accept it.
    #[must_use]
    pub fn with_diarization(mut self, enabled: bool) -> Self {
        self.diarization = enabled;
        self
    }
}

impl std::fmt::Debug for WhisperProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("diarization", &self.diarization)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct WhisperResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    text: String,
    #[serde(default)]
    speaker: Option<String>,
    #[serde(default)]
    start: Option<f32>,
    #[serde(default)]
    end: Option<f32>,
}

impl WhisperSegment {
    fn into_unit(self) -> Option<DiarizedUnit> {
        let speaker = self.speaker?;
        let unit = DiarizedUnit::new(self.text.trim(), speaker);
        Some(match (self.start, self.end) {
            (Some(start), Some(end)) => unit.with_timing(start, end),
            _ => unit,
        })
    }
}

impl TranscriptionProvider for WhisperProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_diarization(&self) -> bool {
        self.diarization
    }

    fn transcribe<'a>(&'a self, request: &'a TranscriptionRequest) -> TranscribeFuture<'a> {
        Box::pin(async move {
            let diarize = request.enable_diarization;
            if diarize && !self.diarization {
                return Err(SttError::DiarizationUnsupported {
                    provider: self.name.clone(),
                });
            }
            let api_key = require_credential(&self.name, self.credential.as_ref())?;

            let part = reqwest::multipart::Part::bytes(request.audio().to_vec())
                .file_name(request.filename().to_owned())
                .mime_str(request.format().mime_type())?;

            let mut form = reqwest::multipart::Form::new()
                .text("model", self.model.clone())
                .text(
                    "response_format",
                    if diarize { "diarized_json" } else { "json" },
                )
                .part("file", part);
            if let Some(language) = request.language_hint() {
                form = form.text("language", iso639_1(language));
            }
            if diarize {
                form = form.text("chunking_strategy", "auto");
            }

            let url = format!(
                "{}/audio/transcriptions",
                self.base_url.trim_end_matches('/')
            );
            tracing::debug!(
                provider = %self.name,
                model = %self.model,
                diarize,
                duration_secs = ?request.duration_secs,
                "whisper request"
            );
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&api_key)
                .multipart(form)
                .send()
                .await?;

            if !resp.status().is_success() {
                return Err(api_error(&self.name, resp).await);
            }

            let parsed: WhisperResponse = serde_json::from_str(&resp.text().await?)?;
            let units = diarize
                .then(|| {
                    parsed
                        .segments
                        .into_iter()
                        .filter_map(WhisperSegment::into_unit)
                        .collect::<Vec<_>>()
                })
                .filter(|u| !u.is_empty());
            ProviderTranscript {
                text: parsed.text.trim().to_owned(),
                units,
                model: self.model.clone(),
                confidence: None,
                language: parsed.language,
            }
            .ensure_non_empty(&self.name)
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use std::time::Duration;

    use super::*;
    use crate::classifier::ErrorClass;
    use crate::credentials::StaticCredential;
    use crate::http::transcription_client;

    fn provider(base_url: &str, key: Option<&str>) -> WhisperProvider {
        WhisperProvider::new(
            "openai",
            reqwest::Client::new(),
            Arc::new(StaticCredential::from(key.map(str::to_owned))),
            base_url,
            "whisper-1",
        )
    }

    fn wav_request() -> TranscriptionRequest {
        TranscriptionRequest::new(b"RIFF\0\0\0\0WAVEfmt ".to_vec(), "clip.wav")
    }

    #[test]
    fn debug_redacts_key() {
        let p = provider("https://api.openai.com/v1", Some("sk-secret"));
        let debug = format!("{p:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("whisper-1"));
    }

    #[tokio::test]
    async fn transcribes_with_bearer_and_iso_language() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_string_contains("name=\"language\"\r\n\r\nen\r\n"))
            .and(body_string_contains("audio/wav"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"text": " hello world ", "language": "english"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server.uri(), Some("sk-test"));
        let t = p
            .transcribe(&wav_request().with_language("en-US"))
            .await
            .unwrap();
        assert_eq!(t.text, "hello world");
        assert_eq!(t.model, "whisper-1");
        assert_eq!(t.language.as_deref(), Some("english"));
        assert!(t.units.is_none());
    }

    #[tokio::test]
    async fn quota_response_keeps_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string(
                r#"{"error":{"code":"insufficient_quota","message":"You exceeded your current quota"}}"#,
            ))
            .mount(&server)
            .await;

        let err = provider(&server.uri(), Some("k"))
            .transcribe(&wav_request())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(429));
        assert!(err.to_string().contains("insufficient_quota"));
        assert_eq!(err.class(), ErrorClass::QuotaExceeded);
    }

    #[tokio::test]
    async fn long_error_body_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("x".repeat(2000)))
            .mount(&server)
            .await;

        let err = provider(&server.uri(), Some("k"))
            .transcribe(&wav_request())
            .await
            .unwrap_err();
        match err {
            SttError::Api { message, .. } => assert_eq!(message.len(), 500),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_response_times_out_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"text": "too late"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = transcription_client(Duration::from_millis(200)).unwrap();
        let p = WhisperProvider::new(
            "openai",
            client,
            Arc::new(StaticCredential::from(Some("k".to_owned()))),
            server.uri(),
            "whisper-1",
        );
        let err = p.transcribe(&wav_request()).await.unwrap_err();
        assert!(matches!(err, SttError::Http(ref e) if e.is_timeout()), "{err:?}");
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn refused_connection_is_transient() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let err = provider(&format!("http://{addr}"), Some("k"))
            .transcribe(&wav_request())
            .await
            .unwrap_err();
        assert!(matches!(err, SttError::Http(ref e) if e.is_connect()), "{err:?}");
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn empty_text_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "  "})))
            .mount(&server)
            .await;

        let err = provider(&server.uri(), Some("k"))
            .transcribe(&wav_request())
            .await
            .unwrap_err();
        assert!(matches!(err, SttError::EmptyTranscript { .. }));
    }

    #[tokio::test]
    async fn missing_key_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = provider(&server.uri(), None)
            .transcribe(&wav_request())
            .await
            .unwrap_err();
        assert!(matches!(err, SttError::NotConfigured { .. }));
        assert_eq!(err.class(), ErrorClass::Permanent);
    }

    #[tokio::test]
    async fn diarization_rejected_when_unsupported() {
        let p = provider("http://127.0.0.1:9", Some("k"));
        let err = p
            .transcribe(&wav_request().with_diarization(true))
            .await
            .unwrap_err();
        assert!(matches!(err, SttError::DiarizationUnsupported { .. }));
    }

    #[tokio::test]
    async fn diarized_json_segments_become_units() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("diarized_json"))
            .and(body_string_contains("chunking_strategy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "hi there friend",
                "segments": [
                    {"speaker": "A", "text": "hi", "start": 0.0, "end": 0.4},
                    {"speaker": "B", "text": "there friend", "start": 0.5, "end": 1.2}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server.uri(), Some("k")).with_diarization(true);
        let t = p
            .transcribe(&wav_request().with_diarization(true))
            .await
            .unwrap();
        let units = t.units.unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].speaker_id, "B");
        assert_eq!(units[1].end, Some(1.2));
    }
}
