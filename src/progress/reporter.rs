use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use super::result::{JobResult, ResultEnvelope};

/// Phase of the job lifecycle as seen by observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Queued,
    Converting,
    Transcribing,
    Finalizing,
    Completed,
    /// The job failed inside the pipeline
    Failed,
    /// The worker failed before a job could run (bad blob, fatal error)
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Queued => "queued",
            Phase::Converting => "converting",
            Phase::Transcribing => "transcribing",
            Phase::Finalizing => "finalizing",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
            Phase::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub percent: u8,
    pub message: String,
    /// ISO-8601 local time
    pub timestamp: String,
}

impl ProgressEvent {
    pub fn new(phase: Phase, percent: u8, message: impl Into<String>) -> Self {
        Self {
            phase,
            percent: percent.min(100),
            message: message.into(),
            timestamp: chrono::Local::now().to_rfc3339(),
        }
    }
}

struct StreamState {
    stream: Box<dyn Write + Send>,
    last_percent: u8,
    finished: bool,
}

/// Per-job progress reporter.
///
/// Created once at job start with the job id; every event goes to the live
/// stream and overwrites the snapshot file. Reporting never fails the caller.
pub struct ProgressReporter {
    job_id: String,
    snapshot_path: Option<PathBuf>,
    state: Mutex<StreamState>,
}

/// Location of the snapshot file for a job
pub fn snapshot_path_for(snapshot_dir: &Path, job_id: &str) -> PathBuf {
    snapshot_dir.join(format!("{}_progress.json", job_id))
}

/// Read the latest snapshot for a job, if one exists and parses
pub fn read_snapshot(snapshot_dir: &Path, job_id: &str) -> Option<ProgressEvent> {
    let content = std::fs::read_to_string(snapshot_path_for(snapshot_dir, job_id)).ok()?;
    serde_json::from_str(&content).ok()
}

impl ProgressReporter {
    /// Reporter writing the live stream to stdout
    pub fn new(job_id: impl Into<String>, snapshot_dir: Option<&Path>) -> Self {
        Self::with_stream(job_id, snapshot_dir, Box::new(std::io::stdout()))
    }

    /// Reporter writing the live stream to an arbitrary sink
    pub fn with_stream(
        job_id: impl Into<String>,
        snapshot_dir: Option<&Path>,
        stream: Box<dyn Write + Send>,
    ) -> Self {
        let job_id = job_id.into();
        let snapshot_path = snapshot_dir.map(|dir| snapshot_path_for(dir, &job_id));

        Self {
            job_id,
            snapshot_path,
            state: Mutex::new(StreamState {
                stream,
                last_percent: 0,
                finished: false,
            }),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Highest percent reported so far
    pub fn last_percent(&self) -> u8 {
        self.lock_state().last_percent
    }

    /// Whether the terminal result has been emitted
    pub fn is_finished(&self) -> bool {
        self.lock_state().finished
    }

    /// Report progress on both channels.
    ///
    /// The percent is clamped to 100 and never goes below a percent already
    /// reported. Ignored once the terminal result has been emitted.
    pub fn report(&self, phase: Phase, percent: u8, message: impl Into<String>) {
        let mut state = self.lock_state();
        let message = message.into();

        if state.finished {
            warn!("Dropping progress after final result: {} {}% - {}", phase, percent, message);
            return;
        }

        let percent = percent.min(100).max(state.last_percent);
        state.last_percent = percent;

        debug!("📊 Progress: {} {}% - {} (job_id={})", phase, percent, message, self.job_id);

        let event = ProgressEvent::new(phase, percent, message);
        match serde_json::to_string(&event) {
            Ok(line) => Self::write_line(&mut state.stream, &line),
            Err(e) => {
                warn!("Could not serialize progress event: {}", e);
                return;
            }
        }

        // Written under the same lock so the snapshot always holds the latest line
        if let Some(path) = &self.snapshot_path {
            if let Err(e) = write_snapshot(path, &event) {
                warn!("Could not write progress file {}: {}", path.display(), e);
            }
        }
    }

    /// Emit the terminal result line. Returns `false` if a result was already emitted.
    pub fn report_result(&self, result: &JobResult) -> bool {
        let mut state = self.lock_state();

        if state.finished {
            warn!("Final result already reported for job {}, ignoring another", self.job_id);
            return false;
        }
        state.finished = true;

        match serde_json::to_string(&ResultEnvelope { result }) {
            Ok(line) => Self::write_line(&mut state.stream, &line),
            Err(e) => error!("❌ Failed to report result: {}", e),
        }

        if result.success {
            info!(
                "✅ SUCCESS: Generated subtitle file: {}",
                result.subtitle_file.as_deref().unwrap_or("-")
            );
            if !result.metadata.is_empty() {
                info!("📈 Metadata: {:?}", result.metadata);
            }
        } else {
            error!("❌ FAILED: {}", result.error.as_deref().unwrap_or("unknown error"));
        }

        true
    }

    fn write_line(stream: &mut Box<dyn Write + Send>, line: &str) {
        let written = writeln!(stream, "{}", line).and_then(|_| stream.flush());
        if let Err(e) = written {
            warn!("Could not write to progress stream: {}", e);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Replace the snapshot atomically: write a temp file, then rename over it
fn write_snapshot(path: &Path, event: &ProgressEvent) -> std::io::Result<()> {
    let content = serde_json::to_string_pretty(event)?;
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::test_support::SharedBuffer;
    use tempfile::TempDir;

    fn reporter(dir: &TempDir) -> (ProgressReporter, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let reporter =
            ProgressReporter::with_stream("job-1", Some(dir.path()), Box::new(buffer.clone()));
        (reporter, buffer)
    }

    #[test]
    fn test_event_line_schema() {
        let dir = TempDir::new().unwrap();
        let (reporter, buffer) = reporter(&dir);

        reporter.report(Phase::Converting, 10, "Starting audio extraction...");

        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["phase"], "converting");
        assert_eq!(lines[0]["percent"], 10);
        assert_eq!(lines[0]["message"], "Starting audio extraction...");
        let timestamp = lines[0]["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn test_snapshot_is_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let (reporter, buffer) = reporter(&dir);

        reporter.report(Phase::Queued, 0, "first");
        reporter.report(Phase::Converting, 25, "second");
        reporter.report(Phase::Converting, 25, "second");

        assert_eq!(buffer.lines().len(), 3);

        let snapshot = read_snapshot(dir.path(), "job-1").unwrap();
        assert_eq!(snapshot.phase, Phase::Converting);
        assert_eq!(snapshot.percent, 25);
        assert_eq!(snapshot.message, "second");
        assert!(!dir.path().join("job-1_progress.json.tmp").exists());
    }

    #[test]
    fn test_percent_never_decreases() {
        let dir = TempDir::new().unwrap();
        let (reporter, buffer) = reporter(&dir);

        reporter.report(Phase::Transcribing, 89, "estimated");
        reporter.report(Phase::Transcribing, 70, "late");
        reporter.report(Phase::Completed, 250, "done");

        let percents: Vec<u64> = buffer
            .lines()
            .iter()
            .map(|line| line["percent"].as_u64().unwrap())
            .collect();
        assert_eq!(percents, vec![89, 89, 100]);
        assert_eq!(reporter.last_percent(), 100);
    }

    #[test]
    fn test_snapshot_failure_is_swallowed() {
        let buffer = SharedBuffer::default();
        let reporter = ProgressReporter::with_stream(
            "job-2",
            Some(Path::new("/definitely/not/a/dir")),
            Box::new(buffer.clone()),
        );

        reporter.report(Phase::Queued, 0, "still reported");
        assert_eq!(buffer.lines().len(), 1);
    }

    #[test]
    fn test_result_emitted_once_and_closes_stream() {
        let dir = TempDir::new().unwrap();
        let (reporter, buffer) = reporter(&dir);

        reporter.report(Phase::Converting, 10, "working");
        assert!(reporter.report_result(&JobResult::failure("boom")));
        assert!(!reporter.report_result(&JobResult::failure("again")));
        reporter.report(Phase::Transcribing, 73, "too late");

        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["result"]["error"], "boom");
        assert!(reporter.is_finished());

        // The snapshot keeps the last progress event
        let snapshot = read_snapshot(dir.path(), "job-1").unwrap();
        assert_eq!(snapshot.message, "working");
    }
}
