use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::subtitle::save_subtitle;
use super::transcript::Transcript;
use super::whisper::{RecognitionOptions, RecognizerError, SpeechRecognizer};
use crate::config::WorkerSettings;
use crate::error::{JobError, Result};
use crate::job::{Choice, Device, JobSpec, WhisperModel};
use crate::progress::{Phase, ProgressEstimator, ProgressReporter};

/// Outcome of a successful transcription stage
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionSummary {
    /// Detected or forced language code
    pub language: Option<String>,
    pub segment_count: usize,
    /// Length of the transcribed speech
    pub audio_seconds: f64,
    pub processing_time: Duration,
}

/// Runs the recognizer over extracted audio and writes the subtitle file
pub struct Transcriber {
    recognizer: Arc<dyn SpeechRecognizer>,
    estimator: ProgressEstimator,
    /// Sample rate of the extracted audio, used for duration estimates
    sample_rate: u32,
}

impl Transcriber {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, settings: &WorkerSettings) -> Self {
        Self {
            recognizer,
            estimator: ProgressEstimator::from_settings(&settings.estimator),
            sample_rate: settings.extraction.sample_rate,
        }
    }

    pub fn with_estimator(mut self, estimator: ProgressEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Requested device, or CPU when an accelerator is requested but missing
    pub async fn resolve_device(&self, requested: Device) -> Device {
        if requested == Device::Cuda && !self.recognizer.accelerator_available().await {
            warn!("⚠️ CUDA requested but not available, falling back to CPU");
            return Device::Cpu;
        }
        requested
    }

    /// Transcribe `audio` and write the subtitle to `output`.
    ///
    /// Reports `transcribing` from 55% to 90% and `finalizing` at 95%.
    pub async fn transcribe(
        &self,
        audio: &Path,
        output: &Path,
        spec: &JobSpec,
        reporter: &Arc<ProgressReporter>,
    ) -> Result<TranscriptionSummary> {
        info!("{}", "=".repeat(60));
        info!("🎙️ STEP 2: SPEECH RECOGNITION");
        info!("{}", "=".repeat(60));
        info!("🔊 Input audio: {}", audio.display());
        info!("📝 Output subtitle: {}", output.display());

        if !audio.exists() {
            error!("❌ Audio file not found: {}", audio.display());
            return Err(JobError::FileNotFound(audio.to_path_buf()));
        }

        let wav_size = tokio::fs::metadata(audio).await?.len();
        let estimated_seconds = wav_size as f64 / (f64::from(self.sample_rate) * 2.0);
        info!(
            "📊 Audio file size: {:.2} MB (~{:.1}s of audio)",
            wav_size as f64 / (1024.0 * 1024.0),
            estimated_seconds
        );

        reporter.report(Phase::Transcribing, 55, "Loading Whisper model...");

        let device = self.resolve_device(spec.device).await;
        info!("🧠 Loading Whisper model '{}' on {}", spec.whisper_model, device);
        let model = self
            .recognizer
            .load_model(spec.whisper_model, device)
            .await
            .map_err(|e| classify(e, spec.whisper_model))?;

        reporter.report(
            Phase::Transcribing,
            65,
            format!("Model loaded: {}", spec.whisper_model),
        );

        let options = RecognitionOptions {
            language: spec.language_code(),
            task: spec.task,
            fp16: spec.fp16 && device == Device::Cuda,
        };
        info!("⚙️ Transcription settings:");
        info!("   Language: {}", options.language.as_deref().unwrap_or("auto-detect"));
        info!("   Task: {}", options.task);
        info!("   FP16: {}", options.fp16);
        info!("   Device: {}", device);

        reporter.report(Phase::Transcribing, 70, "Starting transcription...");

        let start_time = Instant::now();
        let handle = self.estimator.start(Arc::clone(reporter));
        let outcome = self.recognizer.transcribe(&model, audio, &options).await;
        handle.stop().await;
        let processing_time = start_time.elapsed();

        let raw = outcome.map_err(|e| classify(e, spec.whisper_model))?;
        let transcript = Transcript::from_raw(raw, options.language.as_deref());
        let audio_seconds = transcript.duration_secs();

        info!("✅ Transcription completed in {:.1}s", processing_time.as_secs_f64());
        info!(
            "🌐 Detected language: {}",
            transcript.language.as_deref().unwrap_or("unknown")
        );
        info!("📊 Segments: {}", transcript.segment_count());
        if processing_time.as_secs_f64() > 0.0 && audio_seconds > 0.0 {
            info!(
                "⚡ Speed: {:.2}x realtime",
                audio_seconds / processing_time.as_secs_f64()
            );
        }

        reporter.report(
            Phase::Transcribing,
            90,
            "Transcription completed, saving subtitle...",
        );

        let written = save_subtitle(&transcript, output, spec.output_format.as_str()).await?;

        if !output.exists() {
            error!("❌ Subtitle file was not created: {}", output.display());
            return Err(JobError::ArtifactMissing(output.to_path_buf()));
        }

        let subtitle_size = tokio::fs::metadata(output).await?.len();
        info!("💾 {} subtitle saved: {} ({} bytes)", written, output.display(), subtitle_size);
        if audio_seconds > 0.0 {
            info!(
                "📈 Density: {:.1} lines/minute",
                transcript.segment_count() as f64 / (audio_seconds / 60.0)
            );
        }

        reporter.report(Phase::Finalizing, 95, "Subtitle file created");
        info!("{}", "=".repeat(60));

        Ok(TranscriptionSummary {
            language: transcript.language,
            segment_count: transcript.segments.len(),
            audio_seconds,
            processing_time,
        })
    }
}

/// Map a recognizer failure into the job error taxonomy
fn classify(err: RecognizerError, model: WhisperModel) -> JobError {
    match err {
        RecognizerError::OutOfMemory(details) => {
            error!("❌ Out of memory with model '{}': {}", model, details);
            let smaller: Vec<&str> = model
                .smaller_tiers()
                .iter()
                .take(2)
                .map(|tier| tier.as_str())
                .collect();
            let hint = if smaller.is_empty() {
                "tiny/base".to_string()
            } else {
                smaller.join("/")
            };
            JobError::ResourceExhausted {
                model: model.to_string(),
                hint,
            }
        }
        RecognizerError::Io(e) => e.into(),
        other => JobError::Unclassified(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_memory_suggests_smaller_tiers() {
        let err = classify(
            RecognizerError::OutOfMemory("CUDA out of memory".to_string()),
            WhisperModel::Large,
        );
        assert_eq!(err.kind(), "resource_exhausted");
        assert!(err.to_string().contains("(tiny/base)"));

        let err = classify(
            RecognizerError::OutOfMemory(String::new()),
            WhisperModel::Base,
        );
        assert!(err.to_string().contains("(tiny)"));
    }

    #[test]
    fn test_other_failures_are_unclassified() {
        let err = classify(
            RecognizerError::Failed("Traceback".to_string()),
            WhisperModel::Tiny,
        );
        assert_eq!(err.kind(), "unclassified");
        assert_eq!(err.to_string(), "Whisper failed: Traceback");
    }
}
