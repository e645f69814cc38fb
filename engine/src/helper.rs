//! Helper-process collaborators.
//!
//! Capture and extraction run out of process so camera drivers and model
//! runtimes stay out of the PAM path:
//!
//! ```text
//! helper capture --device <path> --width <w> --height <h>   image bytes on stdout
//! helper extract                                            image on stdin, JSON on stdout
//! ```
//!
//! Capture exit status: `0` ok, `2` device not found, `3` device busy.
//! Extraction prints `{"embeddings": [[f64; 128], ...]}`.
//!
//! Children are spawned with `kill_on_drop`, so a session that abandons an
//! in-flight call at its deadline also terminates the process.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use hellou_types::Embedding;

use crate::capture::{
    Capture, CaptureError, CaptureFut, ExtractError, ExtractFut, Extractor, RawSample,
};

pub const EXIT_DEVICE_NOT_FOUND: i32 = 2;
pub const EXIT_DEVICE_BUSY: i32 = 3;

const STDERR_EXCERPT_CHARS: usize = 512;

/// Camera parameters passed to `helper capture`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTarget {
    pub device: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct HelperCapture {
    program: PathBuf,
    target: CaptureTarget,
}

impl HelperCapture {
    pub fn new(program: impl Into<PathBuf>, target: CaptureTarget) -> Self {
        Self {
            program: program.into(),
            target,
        }
    }

    async fn run(&self) -> Result<RawSample, CaptureError> {
        let output = Command::new(&self.program)
            .arg("capture")
            .arg("--device")
            .arg(&self.target.device)
            .arg("--width")
            .arg(self.target.width.to_string())
            .arg("--height")
            .arg(self.target.height.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_error(&self.program, &e))?;

        match output.status.code() {
            Some(0) if output.stdout.is_empty() => {
                Err(CaptureError::Failed("helper returned an empty frame".to_string()))
            }
            Some(0) => Ok(RawSample::new(output.stdout)),
            Some(EXIT_DEVICE_NOT_FOUND) => Err(CaptureError::DeviceNotFound(
                self.target.device.display().to_string(),
            )),
            Some(EXIT_DEVICE_BUSY) => Err(CaptureError::DeviceBusy),
            _ => Err(CaptureError::Failed(failure_summary(&output))),
        }
    }
}

impl Capture for HelperCapture {
    fn capture(&self) -> CaptureFut<'_> {
        Box::pin(self.run())
    }
}

#[derive(Debug, Clone)]
pub struct HelperExtractor {
    program: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ExtractReply {
    embeddings: Vec<Vec<f64>>,
}

impl HelperExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, sample: RawSample) -> Result<Vec<Embedding>, ExtractError> {
        let mut child = Command::new(&self.program)
            .arg("extract")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExtractError::Failed(format!("cannot run {}: {e}", self.program.display()))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExtractError::Failed("helper stdin unavailable".to_string()))?;
        let feed = async move {
            stdin.write_all(sample.as_bytes()).await?;
            stdin.shutdown().await
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output =
            output.map_err(|e| ExtractError::Failed(format!("waiting for helper: {e}")))?;
        if !output.status.success() {
            return Err(ExtractError::Failed(failure_summary(&output)));
        }
        // A helper may legitimately stop reading once it has what it needs.
        if let Err(e) = fed {
            tracing::debug!("Extractor closed stdin early: {e}");
        }

        parse_extract_reply(&output.stdout)
    }
}

impl Extractor for HelperExtractor {
    fn extract(&self, sample: RawSample) -> ExtractFut<'_> {
        Box::pin(self.run(sample))
    }
}

pub(crate) fn parse_extract_reply(stdout: &[u8]) -> Result<Vec<Embedding>, ExtractError> {
    let reply: ExtractReply =
        serde_json::from_slice(stdout).map_err(|e| ExtractError::Malformed(e.to_string()))?;
    reply
        .embeddings
        .into_iter()
        .enumerate()
        .map(|(i, values)| {
            Embedding::new(values).map_err(|e| ExtractError::Malformed(format!("face {i}: {e}")))
        })
        .collect()
}

fn spawn_error(program: &Path, error: &io::Error) -> CaptureError {
    match error.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            CaptureError::HelperUnavailable(format!("{}: {error}", program.display()))
        }
        _ => CaptureError::Failed(format!("cannot run {}: {error}", program.display())),
    }
}

fn failure_summary(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let excerpt = match stderr.char_indices().nth(STDERR_EXCERPT_CHARS) {
        Some((idx, _)) => &stderr[..idx],
        None => stderr,
    };
    if excerpt.is_empty() {
        format!("helper exited with {}", output.status)
    } else {
        format!("helper exited with {}: {excerpt}", output.status)
    }
}
