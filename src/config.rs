use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Process-level settings for the subtitle worker.
///
/// These are independent of the per-job configuration blob: they describe how
/// this worker installation runs (logging, tool budgets, the recognizer
/// executable, where progress snapshots live).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Logging settings
    pub logging: LoggingSettings,

    /// Audio extraction settings
    pub extraction: ExtractionSettings,

    /// Progress estimator settings
    pub estimator: EstimatorSettings,

    /// Speech recognizer settings
    pub recognizer: RecognizerSettings,

    /// Directory for `<job_id>_progress.json` snapshots (default: next to the executable)
    pub snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default log level when `RUST_LOG` is not set
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    /// Hard upper bound on the FFmpeg run (seconds)
    pub timeout_secs: u64,

    /// Output sample rate (Whisper expects 16kHz)
    pub sample_rate: u32,

    /// How much of FFmpeg's stderr is kept in errors and logs
    pub stderr_excerpt_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorSettings {
    /// Seconds between synthesized progress ticks
    pub interval_secs: u64,

    /// Percent added per tick
    pub step: u8,

    /// Percent the estimator starts from
    pub start_percent: u8,

    /// Highest percent the estimator may claim (must stay below 90)
    pub ceiling: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerSettings {
    /// Whisper executable name or path
    pub command: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 3600, // 1 hour
            sample_rate: 16000, // Optimal for Whisper
            stderr_excerpt_chars: 500,
        }
    }
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            step: 3,
            start_percent: 70,
            ceiling: 89,
        }
    }
}

impl Default for RecognizerSettings {
    fn default() -> Self {
        Self {
            command: "whisper".to_string(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            logging: LoggingSettings::default(),
            extraction: ExtractionSettings::default(),
            estimator: EstimatorSettings::default(),
            recognizer: RecognizerSettings::default(),
            snapshot_dir: None,
        }
    }
}

impl ExtractionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EstimatorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl WorkerSettings {
    /// Load settings from an explicit file, the default locations, or defaults.
    ///
    /// Environment overrides are applied last in every case.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::from_default_locations(),
        };

        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Parse a TOML settings file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        tracing::info!("📄 Loaded worker settings from: {}", path.display());
        Ok(settings)
    }

    fn from_default_locations() -> Self {
        let settings_paths = ["subgen-worker.toml", "config/subgen-worker.toml"];

        for path in &settings_paths {
            if let Ok(content) = std::fs::read_to_string(path) {
                match toml::from_str(&content) {
                    Ok(settings) => {
                        tracing::info!("📄 Loaded worker settings from: {}", path);
                        return settings;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse settings file {}: {}", path, e);
                    }
                }
            }
        }

        Self::default()
    }

    /// Override settings from environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("SUBGEN_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(dir) = std::env::var("SUBGEN_SNAPSHOT_DIR") {
            self.snapshot_dir = Some(PathBuf::from(dir));
        }

        if let Ok(timeout) = std::env::var("SUBGEN_FFMPEG_TIMEOUT") {
            match timeout.parse() {
                Ok(secs) => self.extraction.timeout_secs = secs,
                Err(_) => tracing::warn!("Ignoring invalid SUBGEN_FFMPEG_TIMEOUT: {}", timeout),
            }
        }

        if let Ok(command) = std::env::var("SUBGEN_WHISPER_COMMAND") {
            self.recognizer.command = command;
        }
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.extraction.timeout_secs == 0 {
            return Err(anyhow!("extraction.timeout_secs must be greater than 0"));
        }

        if self.extraction.sample_rate == 0 {
            return Err(anyhow!("extraction.sample_rate must be greater than 0"));
        }

        if self.estimator.interval_secs == 0 {
            return Err(anyhow!("estimator.interval_secs must be greater than 0"));
        }

        if self.estimator.step == 0 {
            return Err(anyhow!("estimator.step must be greater than 0"));
        }

        // 90 and above belong to the real post-transcription progress
        if self.estimator.ceiling >= 90 {
            return Err(anyhow!("estimator.ceiling must be below 90"));
        }

        if self.estimator.start_percent > self.estimator.ceiling {
            return Err(anyhow!("estimator.start_percent must not exceed estimator.ceiling"));
        }

        if self.recognizer.command.trim().is_empty() {
            return Err(anyhow!("recognizer.command must not be empty"));
        }

        Ok(())
    }

    /// Directory progress snapshots are written to
    pub fn resolve_snapshot_dir(&self) -> PathBuf {
        if let Some(dir) = &self.snapshot_dir {
            return dir.clone();
        }

        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get runtime settings summary
    pub fn summary(&self) -> String {
        format!(
            "Worker Settings:\n\
            - Log Level: {}\n\
            - FFmpeg Timeout: {}s\n\
            - Sample Rate: {}Hz\n\
            - Estimator: +{}% every {}s from {}% up to {}%\n\
            - Recognizer: {}\n\
            - Snapshot Directory: {}",
            self.logging.level,
            self.extraction.timeout_secs,
            self.extraction.sample_rate,
            self.estimator.step,
            self.estimator.interval_secs,
            self.estimator.start_percent,
            self.estimator.ceiling,
            self.recognizer.command,
            self.resolve_snapshot_dir().display()
        )
    }
}

/// Builder for programmatic settings creation
pub struct SettingsBuilder {
    settings: WorkerSettings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: WorkerSettings::default(),
        }
    }

    pub fn with_snapshot_dir(mut self, dir: PathBuf) -> Self {
        self.settings.snapshot_dir = Some(dir);
        self
    }

    pub fn with_ffmpeg_timeout(mut self, secs: u64) -> Self {
        self.settings.extraction.timeout_secs = secs;
        self
    }

    pub fn with_recognizer_command(mut self, command: &str) -> Self {
        self.settings.recognizer.command = command.to_string();
        self
    }

    pub fn with_estimator(mut self, interval_secs: u64, step: u8, ceiling: u8) -> Self {
        self.settings.estimator.interval_secs = interval_secs;
        self.settings.estimator.step = step;
        self.settings.estimator.ceiling = ceiling;
        self
    }

    pub fn build(self) -> WorkerSettings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = WorkerSettings::default();
        assert_eq!(settings.extraction.timeout_secs, 3600);
        assert_eq!(settings.extraction.sample_rate, 16000);
        assert_eq!(settings.estimator.interval_secs, 5);
        assert_eq!(settings.estimator.step, 3);
        assert_eq!(settings.estimator.ceiling, 89);
        assert_eq!(settings.recognizer.command, "whisper");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_builder() {
        let settings = SettingsBuilder::new()
            .with_snapshot_dir(PathBuf::from("/tmp/snapshots"))
            .with_ffmpeg_timeout(10)
            .with_estimator(1, 5, 80)
            .build();

        assert_eq!(settings.resolve_snapshot_dir(), PathBuf::from("/tmp/snapshots"));
        assert_eq!(settings.extraction.timeout(), Duration::from_secs(10));
        assert_eq!(settings.estimator.step, 5);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_ceiling_must_stay_below_ninety() {
        let settings = SettingsBuilder::new().with_estimator(5, 3, 90).build();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("below 90"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: WorkerSettings = toml::from_str(
            r#"
            snapshot_dir = "/var/run/subgen"

            [extraction]
            timeout_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(settings.extraction.timeout_secs, 120);
        assert_eq!(settings.extraction.sample_rate, 16000);
        assert_eq!(settings.estimator.ceiling, 89);
        assert_eq!(settings.snapshot_dir, Some(PathBuf::from("/var/run/subgen")));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.toml");
        std::fs::write(&path, "[recognizer]\ncommand = \"/opt/whisper/bin/whisper\"\n").unwrap();

        let settings = WorkerSettings::from_file(&path).unwrap();
        assert_eq!(settings.recognizer.command, "/opt/whisper/bin/whisper");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = WorkerSettings::from_file(Path::new("/definitely/not/here.toml"));
        assert!(result.is_err());
    }
}
