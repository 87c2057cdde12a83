use clap::{Arg, Command};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

use subgen_worker::{
    decode, logging, report_fatal, JobError, Pipeline, ProgressReporter, WhisperCli,
    WorkerSettings,
};

const EXIT_FAILURE: u8 = 1;
const EXIT_INTERRUPTED: u8 = 2;

fn build_cli() -> Command {
    Command::new("subgen-worker")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Extracts audio from a video and generates subtitles with Whisper")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("BASE64")
                .help("Base64-encoded JSON job configuration")
                .required(true),
        )
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .value_name("DIR")
                .help("Directory for worker log files")
                .default_value("logs"),
        )
        .arg(
            Arg::new("settings")
                .short('s')
                .long("settings")
                .value_name("FILE")
                .help("Worker settings file (TOML)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
}

/// Emit an `error` event and a failed result for a job that never started
fn fatal(job_id: &str, snapshot_dir: Option<&Path>, err: JobError) -> ExitCode {
    let reporter = ProgressReporter::new(job_id, snapshot_dir);
    report_fatal(&reporter, &err);
    ExitCode::from(EXIT_FAILURE)
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = build_cli().get_matches();

    let blob = matches.get_one::<String>("config").cloned().unwrap_or_default();
    let log_dir = matches
        .get_one::<String>("log-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("logs"));
    let settings_path = matches.get_one::<String>("settings").map(PathBuf::from);
    let verbose = matches.get_flag("verbose");

    // Settings decide the log level, so loading them logs to stderr only
    let loaded = tracing::subscriber::with_default(logging::bootstrap(verbose), || {
        WorkerSettings::load(settings_path.as_deref())
    });
    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            let job_id = uuid::Uuid::new_v4().to_string();
            return fatal(&job_id, None, JobError::Unclassified(format!("{:#}", e)));
        }
    };

    logging::init(&log_dir, &settings.logging.level, verbose);

    info!("{}", "=".repeat(60));
    info!("🚀 Subtitle worker starting (pid {})", std::process::id());
    info!("{}", "=".repeat(60));
    debug!("{}", settings.summary());

    let snapshot_dir = settings.resolve_snapshot_dir();

    let raw = match decode(&blob) {
        Ok(raw) => raw,
        Err(e) => {
            let job_id = uuid::Uuid::new_v4().to_string();
            return fatal(&job_id, Some(snapshot_dir.as_path()), e);
        }
    };

    let job_id = raw.job_id.clone();
    info!("🆔 Job ID: {}", job_id);

    let spec = match raw.into_spec() {
        Ok(spec) => spec,
        Err(e) => return fatal(&job_id, Some(snapshot_dir.as_path()), e),
    };

    let reporter = Arc::new(ProgressReporter::new(job_id, Some(snapshot_dir.as_path())));
    if let Some(path) = reporter.snapshot_path() {
        info!("📍 Progress file: {}", path.display());
    }
    let recognizer = Arc::new(WhisperCli::new(settings.recognizer.command.clone()));
    let pipeline = Pipeline::new(recognizer, settings);

    tokio::select! {
        result = pipeline.run(&spec, Arc::clone(&reporter)) => {
            if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_FAILURE)
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("⚠️ Interrupted by user");
            eprintln!("Interrupted by user");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}
