//! HTTP adapters for the supported speech-to-text backends.

mod deepgram;
mod google;
mod whisper;

pub use deepgram::DeepgramProvider;
pub use google::{DEFAULT_BASE_URL as GOOGLE_DEFAULT_BASE_URL, GoogleSpeechProvider, SpeakerRange};
pub use whisper::WhisperProvider;

use crate::credentials::CredentialSource;
use crate::error::SttError;
use crate::provider::truncate_body;

const ERROR_BODY_LIMIT: usize = 500;

fn require_credential(provider: &str, source: &dyn CredentialSource) -> Result<String, SttError> {
    source.current().ok_or_else(|| SttError::NotConfigured {
        provider: provider.to_owned(),
    })
}

/// Turn a non-success response into [`SttError::Api`], keeping the first 500 bytes of the body.
async fn api_error(provider: &str, resp: reqwest::Response) -> SttError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    SttError::Api {
        provider: provider.to_owned(),
        status,
        message: truncate_body(body, ERROR_BODY_LIMIT),
    }
}

/// Bare ISO-639-1 code: `en-US` becomes `en`.
fn iso639_1(language: &str) -> String {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or(language)
        .to_ascii_lowercase()
}

/// Region-qualified code: `en` becomes `en-US`, `zh` becomes `zh-CN`.
///
/// Codes that already carry a region are normalized to `ll-RR` casing.
fn region_qualified(language: &str) -> String {
    let mut parts = language.split(['-', '_']);
    let lang = parts.next().unwrap_or(language).to_ascii_lowercase();
    if let Some(region) = parts.next().filter(|r| !r.is_empty()) {
        return format!("{lang}-{}", region.to_ascii_uppercase());
    }
    let region = match lang.as_str() {
        "en" => "US",
        "zh" => "CN",
        "ja" => "JP",
        "ko" => "KR",
        "pt" => "BR",
        "es" => "ES",
        "fr" => "FR",
        "de" => "DE",
        "it" => "IT",
        "ru" => "RU",
        "hi" => "IN",
        "ar" => "SA",
        _ => return lang,
    };
    format!("{lang}-{region}")
}
