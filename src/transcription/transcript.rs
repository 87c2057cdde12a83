use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One timed span of recognized speech
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Segment ID
    pub id: u32,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Transcribed text, untrimmed
    pub text: String,
    /// Average log probability
    pub avg_logprob: Option<f64>,
    /// No speech probability
    pub no_speech_prob: Option<f64>,
}

/// Normalized transcription output, produced once and consumed by serialization
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Full transcription text
    pub text: String,
    /// Detected or forced language code
    pub language: Option<String>,
    /// Segments ordered by start time
    pub segments: Vec<Segment>,
    /// Recognizer output exactly as received
    pub source: RawTranscript,
}

/// Transcript as returned by the recognizer (Whisper JSON output).
///
/// Fields the worker does not interpret (`seek`, `tokens`, `temperature`,
/// ...) are kept in `extra` so the structure can be written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTranscript {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub segments: Vec<RawSegment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSegment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_logprob: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_speech_prob: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transcript {
    /// Normalize recognizer output.
    ///
    /// Segments are ordered by start time, times are clamped to be
    /// non-negative with `end >= start`, and missing ids are numbered in order.
    /// The language falls back to the forced language when the recognizer
    /// does not report one.
    pub fn from_raw(raw: RawTranscript, forced_language: Option<&str>) -> Self {
        let mut segments: Vec<Segment> = raw
            .segments
            .iter()
            .enumerate()
            .map(|(i, seg)| {
                let start = finite_non_negative(seg.start);
                let end = finite_non_negative(seg.end).max(start);
                Segment {
                    id: seg.id.unwrap_or(i as u32),
                    start,
                    end,
                    text: seg.text.clone(),
                    avg_logprob: seg.avg_logprob,
                    no_speech_prob: seg.no_speech_prob,
                }
            })
            .collect();

        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        let text = raw.text.clone().unwrap_or_else(|| {
            segments
                .iter()
                .map(|seg| seg.text.trim())
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        });

        let language = raw
            .language
            .clone()
            .filter(|lang| !lang.trim().is_empty())
            .or_else(|| forced_language.map(str::to_string));

        Self {
            text,
            language,
            segments,
            source: raw,
        }
    }

    /// End of the last segment, in seconds
    pub fn duration_secs(&self) -> f64 {
        self.segments.iter().map(|seg| seg.end).fold(0.0_f64, f64::max)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

fn finite_non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
