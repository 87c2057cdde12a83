pub mod subtitle;
pub mod transcriber;
pub mod transcript;
pub mod whisper;

pub use subtitle::{format_timestamp, save_subtitle, TimestampStyle};
pub use transcriber::{Transcriber, TranscriptionSummary};
pub use transcript::{RawSegment, RawTranscript, Segment, Transcript};
pub use whisper::{LoadedModel, RecognitionOptions, RecognizerError, SpeechRecognizer, WhisperCli};
