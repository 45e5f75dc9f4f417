//! Audio container detection from magic bytes, with a filename fallback.

use serde::Serialize;

const PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Wav,
    Mp3,
    WebM,
    Ogg,
    Flac,
    Mp4,
    Unknown,
}

impl ContainerFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::WebM => "webm",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
            Self::Mp4 => "mp4",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::WebM => "audio/webm",
            Self::Ogg => "audio/ogg",
            Self::Flac => "audio/flac",
            Self::Mp4 => "audio/mp4",
            Self::Unknown => "application/octet-stream",
        }
    }

    fn from_extension(filename: &str) -> Self {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "wav" | "wave" => Self::Wav,
            "mp3" => Self::Mp3,
            "webm" | "weba" => Self::WebM,
            "ogg" | "oga" | "opus" => Self::Ogg,
            "flac" => Self::Flac,
            "mp4" | "m4a" => Self::Mp4,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding parameters for providers that cannot self-detect the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodingHint {
    pub encoding: &'static str,
    pub sample_rate_hz: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectedFormat {
    pub container: ContainerFormat,
    pub encoding: Option<EncodingHint>,
    /// True when the container was identified from the payload rather than the filename.
    pub from_signature: bool,
}

impl DetectedFormat {
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        self.container.mime_type()
    }
}

fn sniff(bytes: &[u8]) -> Option<ContainerFormat> {
    let prefix = &bytes[..bytes.len().min(PREFIX_LEN)];
    if prefix.len() >= 12 && &prefix[..4] == b"RIFF" && &prefix[8..12] == b"WAVE" {
        return Some(ContainerFormat::Wav);
    }
    if prefix.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(ContainerFormat::WebM);
    }
    if prefix.len() >= 8 && &prefix[4..8] == b"ftyp" {
        return Some(ContainerFormat::Mp4);
    }
    if prefix.starts_with(b"OggS") {
        return Some(ContainerFormat::Ogg);
    }
    if prefix.starts_with(b"fLaC") {
        return Some(ContainerFormat::Flac);
    }
    let frame_sync = prefix.len() >= 2 && prefix[0] == 0xFF && prefix[1] & 0xE0 == 0xE0;
    if prefix.starts_with(b"ID3") || frame_sync {
        return Some(ContainerFormat::Mp3);
    }
    None
}

/// Sample rate from a canonical RIFF/WAVE `fmt ` chunk, if it sits at the usual offset.
fn wav_sample_rate(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < 28 || &bytes[12..16] != b"fmt " {
        return None;
    }
    let rate = u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
    (rate > 0).then_some(rate)
}

fn encoding_hint(container: ContainerFormat, bytes: &[u8]) -> Option<EncodingHint> {
    let hint = |encoding, sample_rate_hz| {
        Some(EncodingHint {
            encoding,
            sample_rate_hz,
        })
    };
    match container {
        ContainerFormat::Wav => hint("LINEAR16", wav_sample_rate(bytes)),
        ContainerFormat::Flac => hint("FLAC", None),
        ContainerFormat::Mp3 => hint("MP3", Some(44_100)),
        ContainerFormat::WebM => hint("WEBM_OPUS", Some(48_000)),
        ContainerFormat::Ogg => hint("OGG_OPUS", Some(48_000)),
        ContainerFormat::Mp4 | ContainerFormat::Unknown => None,
    }
}

/// Detect the container of `bytes`, falling back to the extension of `filename`.
#[must_use]
pub fn detect(bytes: &[u8], filename: &str) -> DetectedFormat {
    let (container, from_signature) = match sniff(bytes) {
        Some(container) => (container, true),
        None => (ContainerFormat::from_extension(filename), false),
    };
    DetectedFormat {
        container,
        encoding: encoding_hint(container, bytes),
        from_signature,
    }
}
