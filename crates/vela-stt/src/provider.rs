use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::diarize::DiarizedUnit;
use crate::error::SttError;
use crate::format::{self, DetectedFormat};

/// One block of recorded audio to transcribe.
///
/// Cloning is cheap: the audio buffer is shared between fallback attempts.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    audio: Arc<[u8]>,
    filename: String,
    format: DetectedFormat,
    pub language: Option<String>,
    pub duration_secs: Option<f32>,
    pub enable_diarization: bool,
}

impl TranscriptionRequest {
    pub fn new(audio: impl Into<Arc<[u8]>>, filename: impl Into<String>) -> Self {
        let audio = audio.into();
        let filename = filename.into();
        let format = format::detect(&audio, &filename);
        Self {
            audio,
            filename,
            format,
            language: None,
            duration_secs: None,
            enable_diarization: false,
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn with_duration(mut self, secs: f32) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn with_diarization(mut self, enabled: bool) -> Self {
        self.enable_diarization = enabled;
        self
    }

    #[must_use]
    pub fn audio(&self) -> &[u8] {
        &self.audio
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[must_use]
    pub fn format(&self) -> &DetectedFormat {
        &self.format
    }

    /// Language hint with surrounding whitespace removed, `None` when blank.
    #[must_use]
    pub fn language_hint(&self) -> Option<&str> {
        self.language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }
}

/// Provider-neutral output of a single adapter call.
#[derive(Debug, Clone, Default)]
pub struct ProviderTranscript {
    pub text: String,
    /// Word- or segment-level speaker tags, when the provider returned them.
    pub units: Option<Vec<DiarizedUnit>>,
    pub model: String,
    pub confidence: Option<f32>,
    pub language: Option<String>,
}

impl ProviderTranscript {
    /// Reject a success response that carries no usable text.
    ///
    /// # Errors
    ///
    /// Returns [`SttError::EmptyTranscript`] when neither the flat text nor any unit has content.
    pub fn ensure_non_empty(self, provider: &str) -> Result<Self, SttError> {
        let has_units = self
            .units
            .as_ref()
            .is_some_and(|u| u.iter().any(|w| !w.text.trim().is_empty()));
        if self.text.trim().is_empty() && !has_units {
            return Err(SttError::EmptyTranscript {
                provider: provider.to_owned(),
            });
        }
        Ok(self)
    }
}

pub type TranscribeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ProviderTranscript, SttError>> + Send + 'a>>;

/// A remote speech-to-text backend.
pub trait TranscriptionProvider: Send + Sync {
    /// Stable identifier used for health tracking, usage counters, and logs.
    fn name(&self) -> &str;

    fn supports_diarization(&self) -> bool {
        false
    }

    /// Transcribe the request's audio.
    ///
    /// # Errors
    ///
    /// Returns an [`SttError`] carrying the provider's status code and message so the
    /// failure can be classified.
    fn transcribe<'a>(&'a self, request: &'a TranscriptionRequest) -> TranscribeFuture<'a>;
}

/// Truncate an error body to a log-friendly length on a char boundary.
pub(crate) fn truncate_body(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ContainerFormat;

    #[test]
    fn request_detects_format_once() {
        let req = TranscriptionRequest::new(b"RIFF\0\0\0\0WAVE".to_vec(), "clip.webm");
        assert_eq!(req.format().container, ContainerFormat::Wav);
        assert_eq!(req.filename(), "clip.webm");
        assert!(!req.enable_diarization);
    }

    #[test]
    fn request_clone_shares_audio() {
        let req = TranscriptionRequest::new(vec![1u8, 2, 3], "a.wav");
        let copy = req.clone().with_diarization(true);
        assert_eq!(copy.audio().as_ptr(), req.audio().as_ptr());
        assert!(copy.enable_diarization);
        assert!(!req.enable_diarization);
    }

    #[test]
    fn blank_language_hint_is_none() {
        let req = TranscriptionRequest::new(Vec::<u8>::new(), "a.wav").with_language("  ");
        assert!(req.language_hint().is_none());
        let req = req.with_language(" en ");
        assert_eq!(req.language_hint(), Some("en"));
    }

    #[test]
    fn empty_transcript_rejected() {
        let t = ProviderTranscript {
            text: "  ".into(),
            ..ProviderTranscript::default()
        };
        let err = t.ensure_non_empty("openai").unwrap_err();
        assert!(matches!(err, SttError::EmptyTranscript { ref provider } if provider == "openai"));
    }

    #[test]
    fn units_alone_are_enough() {
        let t = ProviderTranscript {
            units: Some(vec![DiarizedUnit::new("hi", 1)]),
            ..ProviderTranscript::default()
        };
        assert!(t.ensure_non_empty("deepgram").is_ok());
    }

    #[test]
    fn truncate_respects_char_boundary() {
        let body = "ééééé".to_owned();
        let out = truncate_body(body, 3);
        assert_eq!(out, "é");
        assert_eq!(truncate_body("short".into(), 500), "short");
    }
}
