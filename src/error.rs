use std::io;
use std::path::PathBuf;

/// Result type for job operations
pub type Result<T> = std::result::Result<T, JobError>;

/// Error taxonomy for a subtitle job.
///
/// Every stage reports one of these kinds; the pipeline turns them into the
/// single terminal result event.
#[derive(thiserror::Error, Debug)]
pub enum JobError {
    /// The configuration blob could not be decoded or parsed
    #[error("Failed to decode configuration: {0}")]
    Decode(String),

    /// Well-formed configuration with a semantically invalid value
    #[error("{0}")]
    Validation(String),

    /// The external decoding tool exited non-zero
    #[error("FFmpeg failed with exit code {}: {stderr}", exit_code_label(.code))]
    ToolFailure { code: Option<i32>, stderr: String },

    /// The external decoding tool exceeded its time budget
    #[error("FFmpeg timed out (exceeded {limit_secs} seconds)")]
    Timeout { limit_secs: u64 },

    /// A stage reported success but its output file does not exist
    #[error("Output file was not created: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Out of memory while running the recognizer
    #[error("Out of memory during transcription with model '{model}'. Try using a smaller model ({hint}).")]
    ResourceExhausted { model: String, hint: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Unclassified(String),
}

fn exit_code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

impl JobError {
    /// Stable kind name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Decode(_) => "decode_error",
            JobError::Validation(_) => "validation_error",
            JobError::ToolFailure { .. } => "tool_failure",
            JobError::Timeout { .. } => "timeout",
            JobError::ArtifactMissing(_) => "artifact_missing",
            JobError::FileNotFound(_) => "file_not_found",
            JobError::ResourceExhausted { .. } => "resource_exhausted",
            JobError::PermissionDenied(_) => "permission_denied",
            JobError::Unclassified(_) => "unclassified",
        }
    }
}

impl From<io::Error> for JobError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => JobError::PermissionDenied(err.to_string()),
            _ => JobError::Unclassified(err.to_string()),
        }
    }
}
