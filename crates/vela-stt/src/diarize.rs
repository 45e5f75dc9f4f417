//! Reconciles word- or segment-level speaker tags into one transcript.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A word or segment attributed to a speaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiarizedUnit {
    pub text: String,
    pub speaker_id: String,
    pub start: Option<f32>,
    pub end: Option<f32>,
}

impl DiarizedUnit {
    pub fn new(text: impl Into<String>, speaker_id: impl ToString) -> Self {
        Self {
            text: text.into(),
            speaker_id: speaker_id.to_string(),
            start: None,
            end: None,
        }
    }

    #[must_use]
    pub fn with_timing(mut self, start: f32, end: f32) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    /// `Speaker {id}: ...` per speaker turn, one turn per line.
    #[default]
    Labeled,
    /// Everyone's words as one continuous text, no attribution.
    Unlabeled,
}

struct Segment<'a> {
    speaker_id: &'a str,
    words: Vec<&'a str>,
}

fn segments(units: &[DiarizedUnit]) -> Vec<Segment<'_>> {
    let mut out: Vec<Segment<'_>> = Vec::new();
    for unit in units {
        let text = unit.text.trim();
        if text.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(seg) if seg.speaker_id == unit.speaker_id => seg.words.push(text),
            _ => out.push(Segment {
                speaker_id: &unit.speaker_id,
                words: vec![text],
            }),
        }
    }
    out
}

/// Number of distinct speakers among units with non-empty text.
#[must_use]
pub fn speaker_count(units: &[DiarizedUnit]) -> usize {
    units
        .iter()
        .filter(|u| !u.text.trim().is_empty())
        .map(|u| u.speaker_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Format `units` in their given order.
///
/// Single-speaker input never gets labels, whatever the mode.
#[must_use]
pub fn format(units: &[DiarizedUnit], mode: LabelMode) -> String {
    let segments = segments(units);
    let speakers: HashSet<&str> = segments.iter().map(|s| s.speaker_id).collect();

    if speakers.len() <= 1 || mode == LabelMode::Unlabeled {
        return segments
            .iter()
            .flat_map(|s| s.words.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
    }

    segments
        .iter()
        .map(|s| format!("Speaker {}: {}", s.speaker_id, s.words.join(" ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format unit-level data when present, otherwise return the provider's flat text.
#[must_use]
pub fn render(units: Option<&[DiarizedUnit]>, flat: &str, mode: LabelMode) -> String {
    match units {
        Some(units) if units.iter().any(|u| !u.text.trim().is_empty()) => format(units, mode),
        _ => flat.to_owned(),
    }
}
