use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, warn};

use super::transcript::{RawTranscript, Segment, Transcript};
use crate::error::{JobError, Result};
use crate::job::{Choice, OutputFormat};

/// Separator style for subtitle timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampStyle {
    /// `HH:MM:SS,mmm`
    Srt,
    /// `HH:MM:SS.mmm`
    Vtt,
}

/// Format seconds as a subtitle timestamp, rounded to the nearest millisecond
pub fn format_timestamp(seconds: f64, style: TimestampStyle) -> String {
    let total_millis = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };

    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    let separator = match style {
        TimestampStyle::Srt => ',',
        TimestampStyle::Vtt => '.',
    };

    format!(
        "{:02}:{:02}:{:02}{}{:03}",
        hours, minutes, secs, separator, millis
    )
}

/// SubRip: numbered blocks separated by blank lines
pub fn render_srt(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(segment.start, TimestampStyle::Srt),
            format_timestamp(segment.end, TimestampStyle::Srt),
            segment.text.trim()
        );
    }
    out
}

/// WebVTT: header, then unnumbered cues
pub fn render_vtt(segments: &[Segment]) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for segment in segments {
        let _ = write!(
            out,
            "{} --> {}\n{}\n\n",
            format_timestamp(segment.start, TimestampStyle::Vtt),
            format_timestamp(segment.end, TimestampStyle::Vtt),
            segment.text.trim()
        );
    }
    out
}

pub fn render_txt(text: &str) -> String {
    text.trim().to_string()
}

/// The recognizer's own structure, without normalization
pub fn render_json(source: &RawTranscript) -> serde_json::Result<String> {
    serde_json::to_string_pretty(source)
}

/// Resolve a format name, falling back to SRT for anything unknown
pub fn resolve_format(name: &str) -> OutputFormat {
    OutputFormat::parse(name).unwrap_or_else(|| {
        warn!(
            "⚠️ Unknown output format '{}', falling back to {}",
            name,
            OutputFormat::Srt
        );
        OutputFormat::Srt
    })
}

/// Render a transcript in the given format
pub fn render(transcript: &Transcript, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Srt => render_srt(&transcript.segments),
        OutputFormat::Vtt => render_vtt(&transcript.segments),
        OutputFormat::Txt => render_txt(&transcript.text),
        OutputFormat::Json => render_json(&transcript.source)
            .map_err(|e| JobError::Unclassified(e.to_string()))?,
    })
}

/// Write the transcript to `path`. Returns the format actually written.
pub async fn save_subtitle(
    transcript: &Transcript,
    path: &Path,
    format_name: &str,
) -> Result<OutputFormat> {
    let format = resolve_format(format_name);
    let content = render(transcript, format)?;

    debug!("💾 Writing {} subtitle ({} bytes) to {}", format, content.len(), path.display());
    tokio::fs::write(path, content).await?;
    Ok(format)
}
