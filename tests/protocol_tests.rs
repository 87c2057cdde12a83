mod common;

use tempfile::TempDir;

use common::{job_blob, write_input, SharedBuffer};
use subgen_worker::progress::read_snapshot;
use subgen_worker::{decode, report_fatal, JobError, Phase, ProgressReporter};

#[test]
fn test_nonexistent_input_is_rejected_before_running() {
    let dir = TempDir::new().unwrap();
    let blob = job_blob(serde_json::json!({
        "job_id": "missing-input",
        "input_file": dir.path().join("nope.mp4"),
        "output_dir": dir.path().join("out"),
    }));

    let raw = decode(&blob).unwrap();
    assert_eq!(raw.job_id, "missing-input");
    let err = raw.into_spec().unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    assert!(err.to_string().starts_with("Input file not found: "));

    let buffer = SharedBuffer::default();
    let reporter =
        ProgressReporter::with_stream("missing-input", Some(dir.path()), Box::new(buffer.clone()));
    let result = report_fatal(&reporter, &err);

    assert!(!result.success);
    let lines = buffer.lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["phase"], "error");
    assert_eq!(lines[1]["result"]["success"], false);
    assert!(!dir.path().join("out").exists());

    let snapshot = read_snapshot(dir.path(), "missing-input").unwrap();
    assert_eq!(snapshot.phase, Phase::Error);
}

#[test]
fn test_malformed_blob_is_a_decode_error() {
    let err = decode("this is not base64!").unwrap_err();
    assert!(matches!(err, JobError::Decode(_)));

    let err = decode(&job_blob(serde_json::json!(["not", "an", "object"]))).unwrap_err();
    assert_eq!(err.kind(), "decode_error");
}

#[test]
fn test_invalid_choice_names_value_and_allowed_set() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "clip.mp4");
    let blob = job_blob(serde_json::json!({
        "input_file": input,
        "output_dir": dir.path(),
        "whisper_model": "huge",
        "output_format": "ass",
    }));

    let err = decode(&blob).unwrap().into_spec().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid model: huge. Must be one of ['tiny', 'base', 'small', 'medium', 'large']"
    );
}

#[test]
fn test_spec_round_trips_through_blob() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "clip.mp4");
    let blob = job_blob(serde_json::json!({
        "input_file": input,
        "output_dir": dir.path().join("subs"),
        "language": "auto",
        "device": "cuda",
        "fp16": true,
        "task": "translate",
        "output_format": "vtt",
    }));

    let spec = decode(&blob).unwrap().into_spec().unwrap();
    let again = decode(&spec.encode()).unwrap().into_spec().unwrap();

    assert_eq!(spec, again);
    assert_eq!(spec.whisper_model.to_string(), "base");
    assert_eq!(spec.ffmpeg_path, "ffmpeg");
    assert_eq!(spec.subtitle_path(), dir.path().join("subs/clip.vtt"));
}

#[test]
fn test_generated_job_id_is_stable() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "clip.mp4");
    let blob = job_blob(serde_json::json!({"input_file": input, "output_dir": dir.path()}));

    let raw = decode(&blob).unwrap();
    let job_id = raw.job_id.clone();
    assert!(!job_id.is_empty());

    let spec = raw.into_spec().unwrap();
    assert_eq!(spec.job_id, job_id);
}

#[test]
fn test_identical_reports_are_last_write_wins() {
    let dir = TempDir::new().unwrap();
    let buffer = SharedBuffer::default();
    let reporter = ProgressReporter::with_stream("twice", Some(dir.path()), Box::new(buffer.clone()));

    reporter.report(Phase::Transcribing, 65, "Model loaded: tiny");
    let first = std::fs::read_to_string(dir.path().join("twice_progress.json")).unwrap();
    reporter.report(Phase::Transcribing, 65, "Model loaded: tiny");

    assert_eq!(buffer.lines().len(), 2);
    let snapshot = read_snapshot(dir.path(), "twice").unwrap();
    assert_eq!(snapshot.percent, 65);
    assert_eq!(snapshot.message, "Model loaded: tiny");
    assert!(!first.is_empty());
}
