#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use subgen_worker::job::{Device, WhisperModel};
use subgen_worker::transcription::{
    LoadedModel, RawTranscript, RecognitionOptions, RecognizerError, SpeechRecognizer,
};

/// Cloneable in-memory live stream
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn lines(&self) -> Vec<serde_json::Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// Progress lines only, without the result line
    pub fn progress(&self) -> Vec<serde_json::Value> {
        self.lines()
            .into_iter()
            .filter(|line| line.get("result").is_none())
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// What the fake recognizer does when asked to transcribe
#[derive(Clone)]
pub enum Outcome {
    Transcript(serde_json::Value),
    OutOfMemory,
    Failure(String),
}

/// Scripted stand-in for Whisper
pub struct FakeRecognizer {
    accelerator: bool,
    outcome: Outcome,
    delay: Duration,
    pub loaded: Mutex<Option<LoadedModel>>,
    pub options: Mutex<Option<RecognitionOptions>>,
}

impl FakeRecognizer {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            accelerator: false,
            outcome,
            delay: Duration::ZERO,
            loaded: Mutex::new(None),
            options: Mutex::new(None),
        }
    }

    pub fn speaking() -> Self {
        Self::new(Outcome::Transcript(sample_transcript()))
    }

    pub fn with_accelerator(mut self, available: bool) -> Self {
        self.accelerator = available;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn loaded_device(&self) -> Option<Device> {
        self.loaded.lock().unwrap().map(|model| model.device)
    }

    pub fn last_options(&self) -> Option<RecognitionOptions> {
        self.options.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechRecognizer for FakeRecognizer {
    async fn accelerator_available(&self) -> bool {
        self.accelerator
    }

    async fn load_model(
        &self,
        model: WhisperModel,
        device: Device,
    ) -> Result<LoadedModel, RecognizerError> {
        let loaded = LoadedModel { model, device };
        *self.loaded.lock().unwrap() = Some(loaded);
        Ok(loaded)
    }

    async fn transcribe(
        &self,
        _model: &LoadedModel,
        _audio: &Path,
        options: &RecognitionOptions,
    ) -> Result<RawTranscript, RecognizerError> {
        *self.options.lock().unwrap() = Some(options.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.outcome {
            Outcome::Transcript(value) => Ok(serde_json::from_value(value.clone()).unwrap()),
            Outcome::OutOfMemory => Err(RecognizerError::OutOfMemory(
                "torch.cuda.OutOfMemoryError: CUDA out of memory".to_string(),
            )),
            Outcome::Failure(message) => Err(RecognizerError::Failed(message.clone())),
        }
    }
}

pub fn sample_transcript() -> serde_json::Value {
    serde_json::json!({
        "text": " Welcome to the show. Today we talk about Rust.",
        "language": "en",
        "segments": [
            {"id": 0, "start": 0.0, "end": 4.2, "text": " Welcome to the show."},
            {"id": 1, "start": 4.2, "end": 9.75, "text": " Today we talk about Rust."}
        ]
    })
}

/// Encode a job configuration the way the parent process does
pub fn job_blob(config: serde_json::Value) -> String {
    base64::engine::general_purpose::STANDARD.encode(config.to_string())
}

/// A fake input video
pub fn write_input(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![0u8; 4096]).unwrap();
    path
}

/// Write an executable shell script named `name` into `dir`
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    {
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(script.as_bytes()).unwrap();
        file.sync_all().unwrap();
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Shell script standing in for FFmpeg. `body` runs with `$out` set to the
/// output path (FFmpeg's last argument).
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
    let script = format!("#!/bin/sh\nfor out; do :; done\n{}\n", body);
    write_script(dir, "fake-ffmpeg", &script)
}

/// Shell script standing in for the whisper CLI. Answers `--help` and writes
/// `transcript` as `<audio stem>.json` into the `--output_dir` it is given.
#[cfg(unix)]
pub fn fake_whisper(dir: &Path, transcript: &serde_json::Value) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
if [ "$1" = "--help" ]; then exit 0; fi
audio="$1"
while [ $# -gt 0 ]; do
  if [ "$1" = "--output_dir" ]; then outdir="$2"; fi
  shift
done
cat > "$outdir/$(basename "$audio" .wav).json" <<'JSON'
{}
JSON
"#,
        transcript
    );
    write_script(dir, "fake-whisper", &script)
}

/// FFmpeg that writes ten seconds of 16kHz mono silence
#[cfg(unix)]
pub fn working_ffmpeg(dir: &Path) -> PathBuf {
    fake_ffmpeg(dir, "head -c 320000 /dev/zero > \"$out\"")
}
