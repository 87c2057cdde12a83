use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Terminal result of a job, emitted exactly once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    /// Extracted audio artifact
    pub wav_file: Option<String>,
    /// Subtitle artifact
    pub subtitle_file: Option<String>,
    /// Human-readable failure reason
    pub error: Option<String>,
    /// Informational only: sizes, durations, detected language, segment count
    pub metadata: BTreeMap<String, String>,
}

/// Wire shape of the result line: `{"result": {...}}`
#[derive(Serialize)]
pub(crate) struct ResultEnvelope<'a> {
    pub result: &'a JobResult,
}

impl JobResult {
    pub fn success(wav_file: &Path, subtitle_file: &Path, metadata: BTreeMap<String, String>) -> Self {
        Self {
            success: true,
            wav_file: Some(wav_file.to_string_lossy().to_string()),
            subtitle_file: Some(subtitle_file.to_string_lossy().to_string()),
            error: None,
            metadata,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            wav_file: None,
            subtitle_file: None,
            error: Some(error.into()),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach an artifact that was produced before the failure
    pub fn with_wav_file(mut self, wav_file: &Path) -> Self {
        self.wav_file = Some(wav_file.to_string_lossy().to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_envelope_shape() {
        let result = JobResult::failure("Audio extraction failed: boom")
            .with_wav_file(Path::new("/out/clip.wav"));
        let line = serde_json::to_value(ResultEnvelope { result: &result }).unwrap();

        assert_eq!(line["result"]["success"], false);
        assert_eq!(line["result"]["wav_file"], "/out/clip.wav");
        assert!(line["result"]["subtitle_file"].is_null());
        assert_eq!(line["result"]["error"], "Audio extraction failed: boom");
        assert!(line["result"]["metadata"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_success_result() {
        let mut metadata = BTreeMap::new();
        metadata.insert("duration_seconds".to_string(), "12.50".to_string());
        let result = JobResult::success(Path::new("a.wav"), Path::new("a.srt"), metadata);

        assert!(result.success);
        assert_eq!(result.subtitle_file.as_deref(), Some("a.srt"));
        assert!(result.error.is_none());
    }
}
