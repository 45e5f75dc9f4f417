use std::sync::Arc;

use serde::Deserialize;

use super::{api_error, require_credential};
use crate::credentials::CredentialSource;
use crate::diarize::DiarizedUnit;
use crate::provider::{
    ProviderTranscript, TranscribeFuture, TranscriptionProvider, TranscriptionRequest,
};

/// Deepgram prerecorded `/listen` endpoint. Raw audio body, word-level speaker tags.
pub struct DeepgramProvider {
    name: String,
    client: reqwest::Client,
    credential: Arc<dyn CredentialSource>,
    base_url: String,
    model: String,
}

impl DeepgramProvider {
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
        }
    }
}

impl std::fmt::Debug for DeepgramProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepgramProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Deserialize)]
struct ListenResults {
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Deserialize)]
struct Channel {
    #[serde(default)]
    detected_language: Option<String>,
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    words: Vec<Word>,
}

#[derive(Deserialize)]
struct Word {
    word: String,
    #[serde(default)]
    punctuated_word: Option<String>,
    #[serde(default)]
    speaker: Option<u32>,
    #[serde(default)]
    start: Option<f32>,
    #[serde(default)]
    end: Option<f32>,
}

impl Word {
    fn into_unit(self) -> Option<DiarizedUnit> {
        let speaker = self.speaker?;
        let unit = DiarizedUnit::new(self.punctuated_word.unwrap_or(self.word), speaker);
        Some(match (self.start, self.end) {
            (Some(start), Some(end)) => unit.with_timing(start, end),
            _ => unit,
        })
    }
}

impl TranscriptionProvider for DeepgramProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_diarization(&self) -> bool {
        true
    }

    fn transcribe<'a>(&'a self, request: &'a TranscriptionRequest) -> TranscribeFuture<'a> {
        Box::pin(async move {
            let api_key = require_credential(&self.name, self.credential.as_ref())?;
            let diarize = request.enable_diarization;

            let mut query: Vec<(&str, String)> = vec![
                ("model", self.model.clone()),
                ("smart_format", "true".to_owned()),
            ];
            match request.language_hint() {
                Some(language) => query.push(("language", language.to_owned())),
                None => query.push(("detect_language", "true".to_owned())),
            }
            if diarize {
                query.push(("diarize", "true".to_owned()));
            }

            let url = format!("{}/listen", self.base_url.trim_end_matches('/'));
            tracing::debug!(
                provider = %self.name,
                model = %self.model,
                diarize,
                duration_secs = ?request.duration_secs,
                "deepgram request"
            );
            let resp = self
                .client
                .post(&url)
                .query(&query)
                .header(reqwest::header::AUTHORIZATION, format!("Token {api_key}"))
                .header(reqwest::header::CONTENT_TYPE, request.format().mime_type())
                .body(request.audio().to_vec())
                .send()
                .await?;

            if !resp.status().is_success() {
                return Err(api_error(&self.name, resp).await);
            }

            let parsed: ListenResponse = serde_json::from_str(&resp.text().await?)?;
            let channel = parsed.results.channels.into_iter().next();
            let language = channel.as_ref().and_then(|c| c.detected_language.clone());
            let alternative = channel.and_then(|c| c.alternatives.into_iter().next());
            let Some(alternative) = alternative else {
                return ProviderTranscript::default().ensure_non_empty(&self.name);
            };
            let units = diarize
                .then(|| {
                    alternative
                        .words
                        .into_iter()
                        .filter_map(Word::into_unit)
                        .collect::<Vec<_>>()
                })
                .filter(|u| !u.is_empty());
            ProviderTranscript {
                text: alternative.transcript.trim().to_owned(),
                units,
                model: self.model.clone(),
                confidence: alternative.confidence,
                language,
            }
            .ensure_non_empty(&self.name)
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::classifier::ErrorClass;
    use crate::credentials::StaticCredential;
    use crate::error::SttError;

    fn provider(base_url: &str) -> DeepgramProvider {
        DeepgramProvider::new(
            "deepgram",
            reqwest::Client::new(),
            Arc::new(StaticCredential::new("dg-key")),
            base_url,
            "nova-2",
        )
    }

    fn webm_request() -> TranscriptionRequest {
        TranscriptionRequest::new(vec![0x1A, 0x45, 0xDF, 0xA3, 0, 0], "clip.webm")
    }

    fn body() -> serde_json::Value {
        serde_json::json!({
            "metadata": {"request_id": "r1"},
            "results": {"channels": [{
                "detected_language": "en",
                "alternatives": [{
                    "transcript": "hi there friend",
                    "confidence": 0.93,
                    "words": [
                        {"word": "hi", "punctuated_word": "Hi,", "speaker": 0, "start": 0.0, "end": 0.3},
                        {"word": "there", "speaker": 1, "start": 0.4, "end": 0.6},
                        {"word": "friend", "speaker": 1, "start": 0.6, "end": 0.9}
                    ]
                }]
            }]}
        })
    }

    #[test]
    fn debug_redacts_key() {
        let debug = format!("{:?}", provider("https://api.deepgram.com/v1"));
        assert!(!debug.contains("dg-key"));
    }

    #[tokio::test]
    async fn diarized_request_returns_word_speakers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/listen"))
            .and(query_param("model", "nova-2"))
            .and(query_param("diarize", "true"))
            .and(query_param("detect_language", "true"))
            .and(header("authorization", "Token dg-key"))
            .and(header("content-type", "audio/webm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body()))
            .expect(1)
            .mount(&server)
            .await;

        let t = provider(&server.uri())
            .transcribe(&webm_request().with_diarization(true))
            .await
            .unwrap();
        assert_eq!(t.text, "hi there friend");
        assert_eq!(t.language.as_deref(), Some("en"));
        assert_eq!(t.confidence, Some(0.93));
        let units = t.units.unwrap();
        assert_eq!(units[0].text, "Hi,");
        assert_eq!(units[0].speaker_id, "0");
        assert_eq!(units[2].speaker_id, "1");
    }

    #[tokio::test]
    async fn language_hint_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("language", "en-US"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body()))
            .expect(1)
            .mount(&server)
            .await;

        let t = provider(&server.uri())
            .transcribe(&webm_request().with_language("en-US"))
            .await
            .unwrap();
        assert!(t.units.is_none());
    }

    #[tokio::test]
    async fn payment_required_is_quota() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(402).set_body_string(r#"{"err_msg":"Project out of credits"}"#),
            )
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .transcribe(&webm_request())
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::QuotaExceeded);
    }

    #[tokio::test]
    async fn no_alternatives_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"results": {"channels": []}})),
            )
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .transcribe(&webm_request())
            .await
            .unwrap_err();
        assert!(matches!(err, SttError::EmptyTranscript { .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .transcribe(&webm_request())
            .await
            .unwrap_err();
        assert!(matches!(err, SttError::Json(_)));
        assert_eq!(err.class(), ErrorClass::Permanent);
    }
}
