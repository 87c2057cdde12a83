use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::config::ExtractionSettings;
use crate::error::{JobError, Result};
use crate::progress::{Phase, ProgressReporter};

/// Bytes per second of 16-bit mono PCM at the given sample rate
fn pcm_bytes_per_second(sample_rate: u32) -> u64 {
    u64::from(sample_rate) * 2
}

/// Audio artifact produced by the extraction stage
#[derive(Debug, Clone)]
pub struct ExtractedAudio {
    pub path: PathBuf,
    pub file_size: u64,
    /// Estimated from the byte count, assuming 16-bit mono PCM
    pub estimated_duration: Duration,
}

/// Extracts a normalized WAV track (mono, 16-bit PCM) with FFmpeg
#[derive(Debug, Clone)]
pub struct AudioExtractor {
    /// FFmpeg executable name or path
    ffmpeg_path: String,
    /// Output sample rate (16kHz optimal for Whisper)
    target_sample_rate: u32,
    /// Hard upper bound on the FFmpeg run
    timeout: Duration,
    /// How much FFmpeg diagnostic output is kept
    stderr_excerpt_chars: usize,
}

impl AudioExtractor {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self::from_settings(ffmpeg_path, &ExtractionSettings::default())
    }

    pub fn from_settings(ffmpeg_path: impl Into<String>, settings: &ExtractionSettings) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            target_sample_rate: settings.sample_rate,
            timeout: settings.timeout(),
            stderr_excerpt_chars: settings.stderr_excerpt_chars,
        }
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// FFmpeg arguments: drop video, 16-bit PCM, fixed rate, mono, overwrite
    pub fn build_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::with_capacity(12);
        args.push("-i".into());
        args.push(input.as_os_str().to_os_string());
        args.push("-vn".into()); // No video stream
        args.push("-acodec".into());
        args.push("pcm_s16le".into()); // 16-bit PCM
        args.push("-ar".into());
        args.push(self.target_sample_rate.to_string().into());
        args.push("-ac".into());
        args.push("1".into()); // Mono channel
        args.push("-y".into()); // Overwrite existing
        args.push(output.as_os_str().to_os_string());
        args
    }

    /// Extract the audio track of `input` into `output`.
    ///
    /// Reports `converting` progress at 10%, 25% and 50%. The output file is
    /// checked independently of FFmpeg's exit status.
    pub async fn extract(
        &self,
        input: &Path,
        output: &Path,
        reporter: &ProgressReporter,
    ) -> Result<ExtractedAudio> {
        info!("{}", "=".repeat(60));
        info!("🎬 STEP 1: AUDIO EXTRACTION");
        info!("{}", "=".repeat(60));
        info!("📁 Input video: {}", input.display());
        info!("🔊 Output audio: {}", output.display());
        info!("🛠️  FFmpeg path: {}", self.ffmpeg_path);

        reporter.report(Phase::Converting, 10, "Starting audio extraction...");

        if !input.exists() {
            error!("❌ Input file not found: {}", input.display());
            return Err(JobError::FileNotFound(input.to_path_buf()));
        }

        let input_size = tokio::fs::metadata(input).await?.len();
        info!("📊 Input file size: {} bytes ({:.2} MB)", input_size, mib(input_size));

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(
            "⏳ Running FFmpeg to extract audio ({}Hz mono WAV)...",
            self.target_sample_rate
        );
        reporter.report(Phase::Converting, 25, "Extracting audio with FFmpeg...");

        self.run_ffmpeg(input, output).await?;

        if !output.exists() {
            error!("❌ Output WAV file was not created: {}", output.display());
            return Err(JobError::ArtifactMissing(output.to_path_buf()));
        }

        let wav_size = tokio::fs::metadata(output).await?.len();
        info!("✅ WAV file created successfully");
        info!("📊 WAV file size: {} bytes ({:.2} MB)", wav_size, mib(wav_size));
        if input_size > 0 {
            let reduction = (1.0 - wav_size as f64 / input_size as f64) * 100.0;
            info!("📉 Size reduction: {:.1}%", reduction);
        }

        reporter.report(Phase::Converting, 50, "Audio extraction completed");
        info!("{}", "=".repeat(60));

        let estimated_duration = Duration::from_secs_f64(
            wav_size as f64 / pcm_bytes_per_second(self.target_sample_rate) as f64,
        );

        Ok(ExtractedAudio {
            path: output.to_path_buf(),
            file_size: wav_size,
            estimated_duration,
        })
    }

    /// Run FFmpeg as a child process under the timeout
    async fn run_ffmpeg(&self, input: &Path, output: &Path) -> Result<()> {
        let args = self.build_args(input, output);
        debug!("🔧 FFmpeg command: {} {:?}", self.ffmpeg_path, args);

        let start_time = Instant::now();
        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!("❌ Failed to start FFmpeg ({}): {}", self.ffmpeg_path, e);
                match e.kind() {
                    std::io::ErrorKind::PermissionDenied => JobError::PermissionDenied(format!(
                        "cannot execute {}: {}",
                        self.ffmpeg_path, e
                    )),
                    _ => JobError::Unclassified(format!(
                        "Failed to start FFmpeg ({}): {}",
                        self.ffmpeg_path, e
                    )),
                }
            })?;

        // FFmpeg is chatty on stderr; drain it concurrently so the pipe never fills
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut bytes = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut bytes).await;
            }
            String::from_utf8_lossy(&bytes).to_string()
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                error!(
                    "⏱️ FFmpeg timed out after {:.1}s (limit: {}s)",
                    start_time.elapsed().as_secs_f64(),
                    self.timeout.as_secs()
                );
                let _ = child.kill().await;
                stderr_task.abort();
                let err = JobError::Timeout {
                    limit_secs: self.timeout.as_secs(),
                };
                eprintln!("{}", err);
                return Err(err);
            }
        };

        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let excerpt: String = stderr.chars().take(self.stderr_excerpt_chars).collect();
            error!("❌ FFmpeg failed with exit code {:?}", status.code());
            error!("📋 FFmpeg stderr: {}", excerpt);
            eprintln!("FFmpeg error: {}", stderr.trim());
            return Err(JobError::ToolFailure {
                code: status.code(),
                stderr: excerpt.trim().to_string(),
            });
        }

        info!(
            "✅ FFmpeg completed successfully in {:.1}s (exit code 0)",
            start_time.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
