//! Job configuration codec
//!
//! The parent process hands the worker one opaque blob (base64 of a JSON
//! object). This module is the only place that knows that encoding: it
//! decodes the blob, fills defaults, validates, and produces an immutable
//! [`JobSpec`].

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{JobError, Result};

/// Keys filled in when absent from the job configuration
const DEFAULT_VALUES: [(&str, DefaultValue); 7] = [
    ("ffmpeg_path", DefaultValue::Str("ffmpeg")),
    ("whisper_model", DefaultValue::Str("base")),
    ("language", DefaultValue::Str("English")),
    ("device", DefaultValue::Str("cpu")),
    ("fp16", DefaultValue::Bool(false)),
    ("task", DefaultValue::Str("transcribe")),
    ("output_format", DefaultValue::Str("srt")),
];

const REQUIRED_KEYS: [&str; 2] = ["input_file", "output_dir"];

/// Language names accepted in place of Whisper language codes
const LANGUAGE_CODES: [(&str, &str); 8] = [
    ("english", "en"),
    ("vietnamese", "vi"),
    ("chinese", "zh"),
    ("japanese", "ja"),
    ("korean", "ko"),
    ("french", "fr"),
    ("german", "de"),
    ("spanish", "es"),
];

#[derive(Clone, Copy)]
enum DefaultValue {
    Str(&'static str),
    Bool(bool),
}

impl DefaultValue {
    fn to_value(self) -> Value {
        match self {
            DefaultValue::Str(s) => Value::String(s.to_string()),
            DefaultValue::Bool(b) => Value::Bool(b),
        }
    }
}

/// A closed set of accepted configuration values
pub trait Choice: Sized + Copy + 'static {
    /// Configuration key this choice is read from
    const KEY: &'static str;
    /// Label used in validation messages
    const LABEL: &'static str;
    /// Every accepted value, in display order
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|choice| choice.as_str() == value)
    }

    /// Allowed values rendered as `['a', 'b']`
    fn allowed() -> String {
        let quoted: Vec<String> = Self::ALL
            .iter()
            .map(|choice| format!("'{}'", choice.as_str()))
            .collect();
        format!("[{}]", quoted.join(", "))
    }
}

/// Whisper model tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhisperModel {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl Choice for WhisperModel {
    const KEY: &'static str = "whisper_model";
    const LABEL: &'static str = "model";
    const ALL: &'static [Self] = &[
        WhisperModel::Tiny,
        WhisperModel::Base,
        WhisperModel::Small,
        WhisperModel::Medium,
        WhisperModel::Large,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            WhisperModel::Tiny => "tiny",
            WhisperModel::Base => "base",
            WhisperModel::Small => "small",
            WhisperModel::Medium => "medium",
            WhisperModel::Large => "large",
        }
    }
}

impl WhisperModel {
    /// Smaller tiers to suggest when this one runs out of memory
    pub fn smaller_tiers(&self) -> Vec<WhisperModel> {
        Self::ALL
            .iter()
            .copied()
            .take_while(|model| model != self)
            .collect()
    }
}

/// Subtitle output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Srt,
    Vtt,
    Txt,
    Json,
}

impl Choice for OutputFormat {
    const KEY: &'static str = "output_format";
    const LABEL: &'static str = "format";
    const ALL: &'static [Self] = &[
        OutputFormat::Srt,
        OutputFormat::Vtt,
        OutputFormat::Txt,
        OutputFormat::Json,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Srt => "srt",
            OutputFormat::Vtt => "vtt",
            OutputFormat::Txt => "txt",
            OutputFormat::Json => "json",
        }
    }
}

/// Recognition task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Transcribe,
    Translate,
}

impl Choice for Task {
    const KEY: &'static str = "task";
    const LABEL: &'static str = "task";
    const ALL: &'static [Self] = &[Task::Transcribe, Task::Translate];

    fn as_str(&self) -> &'static str {
        match self {
            Task::Transcribe => "transcribe",
            Task::Translate => "translate",
        }
    }
}

/// Compute device selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
}

impl Choice for Device {
    const KEY: &'static str = "device";
    const LABEL: &'static str = "device";
    const ALL: &'static [Self] = &[Device::Cpu, Device::Cuda];

    fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(WhisperModel, OutputFormat, Task, Device);

/// Immutable, validated description of one job
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub job_id: String,
    pub input_file: PathBuf,
    pub output_dir: PathBuf,
    pub ffmpeg_path: String,
    pub whisper_model: WhisperModel,
    pub language: String,
    pub task: Task,
    pub fp16: bool,
    pub output_format: OutputFormat,
    pub device: Device,
}

impl JobSpec {
    /// File stem shared by every artifact of this job
    pub fn base_name(&self) -> String {
        self.input_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string())
    }

    /// Destination of the extracted audio
    pub fn wav_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.wav", self.base_name()))
    }

    /// Destination of the subtitle file
    pub fn subtitle_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.base_name(), self.output_format))
    }

    /// Whisper language code to force, `None` for auto-detection
    pub fn language_code(&self) -> Option<String> {
        resolve_language(&self.language)
    }

    /// Encode this spec into the blob format accepted by [`decode`]
    pub fn encode(&self) -> String {
        let mut values = Map::new();
        values.insert("job_id".into(), Value::String(self.job_id.clone()));
        values.insert("input_file".into(), path_value(&self.input_file));
        values.insert("output_dir".into(), path_value(&self.output_dir));
        values.insert("ffmpeg_path".into(), Value::String(self.ffmpeg_path.clone()));
        values.insert("whisper_model".into(), choice_value(self.whisper_model));
        values.insert("language".into(), Value::String(self.language.clone()));
        values.insert("device".into(), choice_value(self.device));
        values.insert("fp16".into(), Value::Bool(self.fp16));
        values.insert("task".into(), choice_value(self.task));
        values.insert("output_format".into(), choice_value(self.output_format));

        let json = Value::Object(values).to_string();
        base64::engine::general_purpose::STANDARD.encode(json)
    }
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().to_string())
}

fn choice_value<C: Choice>(choice: C) -> Value {
    Value::String(choice.as_str().to_string())
}

/// Decoded but not yet validated job configuration
#[derive(Debug, Clone)]
pub struct RawJobConfig {
    /// Job identity, fixed for the life of the process
    pub job_id: String,
    pub values: Map<String, Value>,
}

/// Decode a configuration blob.
///
/// Fails with [`JobError::Decode`] if the blob is not base64, not UTF-8, not
/// JSON, or not a JSON object. A job id is generated here when the blob does
/// not carry one.
pub fn decode(blob: &str) -> Result<RawJobConfig> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(blob.trim())
        .map_err(|e| JobError::Decode(format!("invalid base64: {}", e)))?;

    let json = String::from_utf8(bytes)
        .map_err(|e| JobError::Decode(format!("invalid UTF-8: {}", e)))?;

    let value: Value = serde_json::from_str(&json)
        .map_err(|e| JobError::Decode(format!("invalid JSON: {}", e)))?;

    let values = match value {
        Value::Object(values) => values,
        other => {
            return Err(JobError::Decode(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            )))
        }
    };

    let job_id = values
        .get("job_id")
        .and_then(job_id_text)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    Ok(RawJobConfig { job_id, values })
}

/// Text form of a supplied job id. Numbers and booleans keep the id the
/// parent sent; anything else gets a generated id.
fn job_id_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(id) => id.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => {
            warn!(
                "⚠️ Ignoring job_id of type {}, generating a new one",
                json_type_name(other)
            );
            return None;
        }
    };
    Some(text).filter(|id| !id.is_empty())
}

impl RawJobConfig {
    /// Apply defaults, validate, and build the typed job spec
    pub fn into_spec(mut self) -> Result<JobSpec> {
        apply_defaults(&mut self.values);
        validate(&self.values)?;

        let values = &self.values;
        Ok(JobSpec {
            job_id: self.job_id.clone(),
            input_file: PathBuf::from(string_field(values, "input_file")?),
            output_dir: PathBuf::from(string_field(values, "output_dir")?),
            ffmpeg_path: string_field(values, "ffmpeg_path")?,
            whisper_model: choice_field(values)?,
            language: string_field(values, "language")?,
            task: choice_field(values)?,
            fp16: bool_field(values, "fp16")?,
            output_format: choice_field(values)?,
            device: choice_field(values)?,
        })
    }
}

/// Fill every missing optional key from the default table.
///
/// Present keys are never overwritten; an explicit `null` counts as missing.
pub fn apply_defaults(values: &mut Map<String, Value>) {
    for (key, default) in DEFAULT_VALUES {
        let missing = values.get(key).map_or(true, Value::is_null);
        if missing {
            values.insert(key.to_string(), default.to_value());
        }
    }
}

/// Validate raw configuration values, stopping at the first violated rule
pub fn validate(values: &Map<String, Value>) -> Result<()> {
    for key in REQUIRED_KEYS {
        if values.get(key).map_or(true, Value::is_null) {
            return Err(JobError::Validation(format!("Missing required field: {}", key)));
        }
    }

    let input_file = string_field(values, "input_file")?;
    if !Path::new(&input_file).exists() {
        return Err(JobError::Validation(format!("Input file not found: {}", input_file)));
    }

    check_choice::<WhisperModel>(values)?;
    check_choice::<OutputFormat>(values)?;
    check_choice::<Task>(values)?;
    check_choice::<Device>(values)?;

    Ok(())
}

/// Map a language selector to a Whisper language code.
///
/// `auto` means no forced language. Names outside the table are passed
/// through unchanged, on the assumption that they already are codes.
pub fn resolve_language(language: &str) -> Option<String> {
    let lowered = language.trim().to_lowercase();
    if lowered == "auto" {
        return None;
    }

    LANGUAGE_CODES
        .iter()
        .find(|(name, _)| *name == lowered)
        .map(|(_, code)| code.to_string())
        .or_else(|| Some(language.trim().to_string()))
}

fn check_choice<C: Choice>(values: &Map<String, Value>) -> Result<()> {
    choice_field::<C>(values).map(|_| ())
}

fn choice_field<C: Choice>(values: &Map<String, Value>) -> Result<C> {
    let value = values.get(C::KEY).unwrap_or(&Value::Null);
    value
        .as_str()
        .and_then(C::parse)
        .ok_or_else(|| {
            JobError::Validation(format!(
                "Invalid {}: {}. Must be one of {}",
                C::LABEL,
                display_value(value),
                C::allowed()
            ))
        })
}

fn string_field(values: &Map<String, Value>, key: &str) -> Result<String> {
    match values.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(JobError::Validation(format!(
            "Invalid value for {}: expected a string, got {}",
            key,
            json_type_name(other)
        ))),
        None => Err(JobError::Validation(format!("Missing required field: {}", key))),
    }
}

fn bool_field(values: &Map<String, Value>, key: &str) -> Result<bool> {
    match values.get(key) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(JobError::Validation(format!(
            "Invalid value for {}: expected a boolean, got {}",
            key,
            json_type_name(other)
        ))),
        None => Err(JobError::Validation(format!("Missing required field: {}", key))),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
