/// Subtitle Worker - Rust Implementation
///
/// Turns one video file into a subtitle file: FFmpeg extracts a 16kHz mono
/// WAV track, Whisper transcribes it, and progress is reported as JSON lines
/// on stdout plus a per-job snapshot file for out-of-band polling.

pub mod audio;
pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod state;
pub mod transcription;

// Re-export main types for easy access
pub use crate::audio::{AudioExtractor, ExtractedAudio};
pub use crate::config::{SettingsBuilder, WorkerSettings};
pub use crate::error::{JobError, Result};
pub use crate::job::{decode, JobSpec, OutputFormat, RawJobConfig, WhisperModel};
pub use crate::pipeline::{report_fatal, Pipeline};
pub use crate::progress::{JobResult, Phase, ProgressEstimator, ProgressEvent, ProgressReporter};
pub use crate::state::JobState;
pub use crate::transcription::{
    SpeechRecognizer, Transcriber, Transcript, TranscriptionSummary, WhisperCli,
};
