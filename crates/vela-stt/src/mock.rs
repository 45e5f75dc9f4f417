//! Scripted transcription provider for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::diarize::DiarizedUnit;
use crate::error::SttError;
use crate::provider::{ProviderTranscript, TranscribeFuture, TranscriptionProvider, TranscriptionRequest};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Units(Vec<DiarizedUnit>),
    /// API failure with a status code.
    Status(u16, String),
    /// Failure without a status code, classified by message alone.
    Error(String),
    Empty,
}

impl MockReply {
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_owned())
    }

    #[must_use]
    pub fn quota() -> Self {
        Self::Status(429, "You exceeded your current quota".to_owned())
    }

    #[must_use]
    pub fn server_error() -> Self {
        Self::Status(503, "service unavailable".to_owned())
    }

    #[must_use]
    pub fn bad_request() -> Self {
        Self::Status(400, "invalid audio file".to_owned())
    }
}

#[derive(Debug, Clone)]
pub struct MockProvider {
    name: String,
    diarization: bool,
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    pub default_reply: MockReply,
    pub delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<TranscriptionRequest>>>,
}

impl MockProvider {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            diarization: false,
            replies: Arc::new(Mutex::new(VecDeque::new())),
            default_reply: MockReply::text("mock transcript"),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replies consumed in order; `default_reply` once the script runs out.
    #[must_use]
    pub fn with_replies(mut self, replies: Vec<MockReply>) -> Self {
        self.replies = Arc::new(Mutex::new(replies.into()));
        self
    }

    #[must_use]
    pub fn with_default(mut self, reply: MockReply) -> Self {
        self.default_reply = reply;
        self
    }

    #[must_use]
    pub fn with_diarization(mut self) -> Self {
        self.diarization = true;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, including the effective diarization flag.
    #[must_use]
    pub fn requests(&self) -> Vec<TranscriptionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self) -> MockReply {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

impl TranscriptionProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_diarization(&self) -> bool {
        self.diarization
    }

    fn transcribe<'a>(&'a self, request: &'a TranscriptionRequest) -> TranscribeFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let transcript = match self.next_reply() {
                MockReply::Text(text) => ProviderTranscript {
                    text,
                    model: "mock".into(),
                    ..ProviderTranscript::default()
                },
                MockReply::Units(units) => ProviderTranscript {
                    text: units
                        .iter()
                        .map(|u| u.text.as_str())
                        .collect::<Vec<_>>()
                        .join(" "),
                    units: Some(units),
                    model: "mock".into(),
                    ..ProviderTranscript::default()
                },
                MockReply::Status(status, message) => {
                    return Err(SttError::Api {
                        provider: self.name.clone(),
                        status,
                        message,
                    });
                }
                MockReply::Error(message) => return Err(SttError::Other(message)),
                MockReply::Empty => ProviderTranscript {
                    model: "mock".into(),
                    ..ProviderTranscript::default()
                },
            };
            Ok(transcript)
        })
    }
}
