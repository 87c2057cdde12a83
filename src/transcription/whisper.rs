use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::transcript::RawTranscript;
use crate::job::{Choice, Device, Task, WhisperModel};

/// How many trailing diagnostic lines are kept from a failed run
const STDERR_TAIL_LINES: usize = 20;

/// Failure of the speech recognizer
#[derive(thiserror::Error, Debug)]
pub enum RecognizerError {
    #[error("Whisper is not available: {0}")]
    Unavailable(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Whisper failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse Whisper output: {0}")]
    Parse(String),
}

/// A model tier loaded for a concrete device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedModel {
    pub model: WhisperModel,
    pub device: Device,
}

/// Options for one recognition call
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionOptions {
    /// Forced language code, `None` for auto-detection
    pub language: Option<String>,
    pub task: Task,
    /// Half precision, only meaningful on an accelerator
    pub fp16: bool,
}

/// Speech recognition backend.
///
/// `transcribe` is a single long call without progress callbacks; callers
/// synthesize progress around it.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Whether a hardware accelerator can be used
    async fn accelerator_available(&self) -> bool;

    /// Load `model` for `device`
    async fn load_model(
        &self,
        model: WhisperModel,
        device: Device,
    ) -> Result<LoadedModel, RecognizerError>;

    /// Recognize speech in `audio`
    async fn transcribe(
        &self,
        model: &LoadedModel,
        audio: &Path,
        options: &RecognitionOptions,
    ) -> Result<RawTranscript, RecognizerError>;
}

/// Recognizer backed by the OpenAI Whisper command line tool
#[derive(Debug, Clone)]
pub struct WhisperCli {
    command: String,
}

impl WhisperCli {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments for one run writing JSON into `output_dir`
    pub fn build_args(
        &self,
        model: &LoadedModel,
        audio: &Path,
        output_dir: &Path,
        options: &RecognitionOptions,
    ) -> Vec<String> {
        let mut args = vec![
            audio.to_string_lossy().to_string(),
            "--model".to_string(),
            model.model.as_str().to_string(),
            "--device".to_string(),
            model.device.as_str().to_string(),
            "--task".to_string(),
            options.task.as_str().to_string(),
            "--fp16".to_string(),
            if options.fp16 { "True" } else { "False" }.to_string(),
            "--output_format".to_string(),
            "json".to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--verbose".to_string(),
            "False".to_string(),
        ];

        if let Some(language) = &options.language {
            args.push("--language".to_string());
            args.push(language.clone());
        }

        args
    }

    async fn check_command_available(cmd_name: &str) -> bool {
        Command::new(cmd_name)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Find the JSON file Whisper wrote for `audio`
    async fn find_output(output_dir: &Path, audio: &Path) -> Option<PathBuf> {
        if let Some(stem) = audio.file_stem() {
            let expected = output_dir.join(format!("{}.json", stem.to_string_lossy()));
            if expected.exists() {
                return Some(expected);
            }
        }

        let mut entries = tokio::fs::read_dir(output_dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                return Some(path);
            }
        }
        None
    }
}

impl Default for WhisperCli {
    fn default() -> Self {
        Self::new("whisper")
    }
}

/// Whether an accelerator is configured or visible
fn accelerator_from_env() -> Option<bool> {
    if let Ok(value) = std::env::var("WHISPER_USE_GPU") {
        return Some(matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"));
    }
    if let Ok(value) = std::env::var("CUDA_VISIBLE_DEVICES") {
        let value = value.trim();
        return Some(!value.is_empty() && value != "-1");
    }
    None
}

/// Heuristic match for allocator failures in recognizer diagnostics
pub fn is_out_of_memory(diagnostics: &str) -> bool {
    let lower = diagnostics.to_lowercase();
    ["out of memory", "outofmemoryerror", "memoryerror", "cannot allocate memory"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Forward a child's output lines to the log, keeping the last few
fn drain_lines<R>(reader: R, label: &'static str) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut tail = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            debug!("🎙️  Whisper {}: {}", label, line);
            if tail.len() == STDERR_TAIL_LINES {
                tail.remove(0);
            }
            tail.push(line);
        }
        tail
    })
}

#[async_trait]
impl SpeechRecognizer for WhisperCli {
    async fn accelerator_available(&self) -> bool {
        if let Some(available) = accelerator_from_env() {
            return available;
        }
        Command::new("nvidia-smi")
            .arg("-L")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn load_model(
        &self,
        model: WhisperModel,
        device: Device,
    ) -> Result<LoadedModel, RecognizerError> {
        if !Self::check_command_available(&self.command).await {
            error!("❌ Whisper command not found: {}", self.command);
            return Err(RecognizerError::Unavailable(format!(
                "'{}' not found. Please install: pip install openai-whisper",
                self.command
            )));
        }

        info!("🧠 Whisper model '{}' ready on {}", model, device);
        Ok(LoadedModel { model, device })
    }

    async fn transcribe(
        &self,
        model: &LoadedModel,
        audio: &Path,
        options: &RecognitionOptions,
    ) -> Result<RawTranscript, RecognizerError> {
        let output_dir = tempfile::Builder::new().prefix("whisper_").tempdir()?;
        let args = self.build_args(model, audio, output_dir.path(), options);

        info!("🚀 Running Whisper: {} model on {}", model.model, audio.display());
        debug!("🔧 Whisper command: {} {:?}", self.command, args);

        let start_time = Instant::now();
        let mut child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecognizerError::Unavailable(format!("{}: {}", self.command, e)))?;

        let stdout_task = child.stdout.take().map(|out| drain_lines(out, "stdout"));
        let stderr_task = child.stderr.take().map(|err| drain_lines(err, "stderr"));

        let status = child.wait().await?;

        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default().join("\n"),
            None => String::new(),
        };

        if !status.success() {
            error!(
                "❌ Whisper exited with {:?} after {:.1}s",
                status.code(),
                start_time.elapsed().as_secs_f64()
            );
            if is_out_of_memory(&stderr_tail) {
                return Err(RecognizerError::OutOfMemory(stderr_tail));
            }
            return Err(RecognizerError::Failed(if stderr_tail.is_empty() {
                format!("exit code {:?}", status.code())
            } else {
                stderr_tail
            }));
        }

        let json_path = Self::find_output(output_dir.path(), audio).await.ok_or_else(|| {
            RecognizerError::Parse(format!(
                "no JSON output in {}",
                output_dir.path().display()
            ))
        })?;

        let content = tokio::fs::read_to_string(&json_path).await?;
        let transcript: RawTranscript =
            serde_json::from_str(&content).map_err(|e| RecognizerError::Parse(e.to_string()))?;

        if transcript.segments.is_empty() {
            warn!("⚠️ Whisper returned no segments for {}", audio.display());
        }
        info!(
            "✅ Whisper finished in {:.1}s with {} segments",
            start_time.elapsed().as_secs_f64(),
            transcript.segments.len()
        );

        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(language: Option<&str>) -> RecognitionOptions {
        RecognitionOptions {
            language: language.map(str::to_string),
            task: Task::Translate,
            fp16: false,
        }
    }

    #[test]
    fn test_whisper_arguments() {
        let cli = WhisperCli::default();
        let model = LoadedModel {
            model: WhisperModel::Small,
            device: Device::Cpu,
        };

        let args = cli.build_args(&model, Path::new("a.wav"), Path::new("/tmp/w"), &options(Some("de")));

        assert_eq!(args[0], "a.wav");
        let joined = args.join(" ");
        assert!(joined.contains("--model small"));
        assert!(joined.contains("--device cpu"));
        assert!(joined.contains("--task translate"));
        assert!(joined.contains("--fp16 False"));
        assert!(joined.contains("--output_format json"));
        assert!(joined.ends_with("--language de"));
    }

    #[test]
    fn test_auto_language_is_omitted() {
        let cli = WhisperCli::default();
        let model = LoadedModel {
            model: WhisperModel::Tiny,
            device: Device::Cuda,
        };

        let args = cli.build_args(&model, Path::new("a.wav"), Path::new("/tmp/w"), &options(None));
        assert!(!args.iter().any(|arg| arg == "--language"));
    }

    #[test]
    fn test_out_of_memory_detection() {
        assert!(is_out_of_memory("torch.cuda.OutOfMemoryError: CUDA out of memory."));
        assert!(is_out_of_memory("MemoryError"));
        assert!(!is_out_of_memory("RuntimeError: bad input"));
    }

    #[tokio::test]
    async fn test_missing_command_is_unavailable() {
        let cli = WhisperCli::new("/nonexistent/whisper-binary");
        let err = cli
            .load_model(WhisperModel::Base, Device::Cpu)
            .await
            .unwrap_err();

        assert!(matches!(err, RecognizerError::Unavailable(_)));
    }
}
