use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::audio::AudioExtractor;
use crate::config::WorkerSettings;
use crate::error::JobError;
use crate::job::JobSpec;
use crate::progress::{JobResult, Phase, ProgressReporter};
use crate::state::JobState;
use crate::transcription::{SpeechRecognizer, Transcriber, TranscriptionSummary};

/// Logs the total elapsed time of a job exactly once, when dropped
struct ElapsedGuard {
    job_id: String,
    started: Instant,
}

impl ElapsedGuard {
    fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            started: Instant::now(),
        }
    }
}

impl Drop for ElapsedGuard {
    fn drop(&mut self) {
        info!(
            "⏱️  Job {} finished in {:.2}s",
            self.job_id,
            self.started.elapsed().as_secs_f64()
        );
    }
}

/// Sequences extraction, transcription and serialization for one job
pub struct Pipeline {
    settings: WorkerSettings,
    transcriber: Transcriber,
}

impl Pipeline {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, settings: WorkerSettings) -> Self {
        let transcriber = Transcriber::new(recognizer, &settings);
        Self {
            settings,
            transcriber,
        }
    }

    /// Run a job to its terminal result.
    ///
    /// Never returns an error: every failure becomes a failed [`JobResult`],
    /// which is also emitted on the reporter exactly once.
    pub async fn run(&self, spec: &JobSpec, reporter: Arc<ProgressReporter>) -> JobResult {
        let _elapsed = ElapsedGuard::new(&spec.job_id);
        let started = Instant::now();
        let mut state = JobState::default();

        info!("{}", "=".repeat(60));
        info!("🚀 SUBTITLE JOB {}", spec.job_id);
        info!("{}", "=".repeat(60));
        info!("📁 Input: {}", spec.input_file.display());
        info!("📂 Output directory: {}", spec.output_dir.display());
        info!(
            "⚙️ Model: {} | Language: {} | Task: {} | Format: {} | Device: {} | FP16: {}",
            spec.whisper_model, spec.language, spec.task, spec.output_format, spec.device, spec.fp16
        );

        reporter.report(state.phase(), 0, "Job queued");

        if let Err(e) = tokio::fs::create_dir_all(&spec.output_dir).await {
            let err = JobError::from(e);
            return fail(&reporter, &mut state, "Setup", err, None);
        }

        let wav_path = spec.wav_path();
        let subtitle_path = spec.subtitle_path();

        state.advance();
        let extractor = AudioExtractor::from_settings(&spec.ffmpeg_path, &self.settings.extraction);
        let audio = match extractor.extract(&spec.input_file, &wav_path, &reporter).await {
            Ok(audio) => audio,
            Err(err) => return fail(&reporter, &mut state, "Audio extraction", err, None),
        };

        state.advance();
        let summary = match self
            .transcriber
            .transcribe(&audio.path, &subtitle_path, spec, &reporter)
            .await
        {
            Ok(summary) => summary,
            Err(err) => {
                return fail(&reporter, &mut state, "Transcription", err, Some(audio.path.as_path()))
            }
        };

        state.advance();
        let metadata = build_metadata(spec, &audio.path, &subtitle_path, &summary, started).await;

        state.advance();
        reporter.report(state.phase(), 100, "Processing completed successfully");

        let result = JobResult::success(&audio.path, &subtitle_path, metadata);
        reporter.report_result(&result);
        result
    }
}

/// Move to `Failed`, report it, and emit the failed result
fn fail(
    reporter: &ProgressReporter,
    state: &mut JobState,
    stage: &str,
    err: JobError,
    wav_file: Option<&Path>,
) -> JobResult {
    let from = *state;
    let message = format!("{} failed: {}", stage, err);
    error!("❌ {} (state: {}, kind: {})", message, from, err.kind());

    state.fail();
    reporter.report(state.phase(), reporter.last_percent(), message.as_str());

    let mut result = JobResult::failure(message);
    if let Some(wav) = wav_file {
        result = result.with_wav_file(wav);
    }
    reporter.report_result(&result);
    result
}

async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

async fn build_metadata(
    spec: &JobSpec,
    wav_path: &Path,
    subtitle_path: &Path,
    summary: &TranscriptionSummary,
    started: Instant,
) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert(
        "input_size".to_string(),
        file_size(&spec.input_file).await.to_string(),
    );
    metadata.insert("wav_size".to_string(), file_size(wav_path).await.to_string());
    metadata.insert(
        "subtitle_size".to_string(),
        file_size(subtitle_path).await.to_string(),
    );
    metadata.insert(
        "duration_seconds".to_string(),
        format!("{:.2}", started.elapsed().as_secs_f64()),
    );
    metadata.insert(
        "processing_time".to_string(),
        format!("{:.2}", summary.processing_time.as_secs_f64()),
    );
    metadata.insert(
        "audio_seconds".to_string(),
        format!("{:.2}", summary.audio_seconds),
    );
    metadata.insert("base_name".to_string(), spec.base_name());
    metadata.insert(
        "language".to_string(),
        summary.language.clone().unwrap_or_else(|| "unknown".to_string()),
    );
    metadata.insert(
        "segment_count".to_string(),
        summary.segment_count.to_string(),
    );
    metadata
}

/// Report a failure that happened before a job could run
pub fn report_fatal(reporter: &ProgressReporter, err: &JobError) -> JobResult {
    let message = err.to_string();
    error!("❌ Fatal error ({}): {}", err.kind(), message);
    eprintln!("Error: {}", message);

    reporter.report(Phase::Error, reporter.last_percent(), message.as_str());
    let result = JobResult::failure(message);
    reporter.report_result(&result);
    result
}
