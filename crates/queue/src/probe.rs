//! Source duration probing.
//!
//! Runs `ffprobe` against the source video to learn its duration, which the
//! disk-space estimate and the progress percentage both depend on.

use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe ran but reported failure.
    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    /// Failed to parse ffprobe JSON output.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),

    /// IO error during probe (usually ffprobe missing from PATH).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Duration probe collaborator. Blocking; callers run it off the async runtime.
pub trait DurationProbe: Send + Sync {
    fn duration_secs(&self, path: &Path) -> Result<f64, ProbeError>;
}

/// [`DurationProbe`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeDurationProbe {
    ffprobe_path: String,
}

impl FfprobeDurationProbe {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

impl DurationProbe for FfprobeDurationProbe {
    fn duration_secs(&self, path: &Path) -> Result<f64, ProbeError> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::FfprobeFailed(format!(
                "ffprobe exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_ffprobe_duration(&stdout)
    }
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
    }
}

/// Extracts `format.duration` (seconds) from ffprobe JSON output.
pub fn parse_ffprobe_duration(json_str: &str) -> Result<f64, ProbeError> {
    let parsed: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let duration = parsed
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| ProbeError::ParseError("Missing format.duration".to_string()))?;

    let secs = duration
        .trim()
        .parse::<f64>()
        .map_err(|e| ProbeError::ParseError(format!("Bad duration '{}': {}", duration, e)))?;

    if !secs.is_finite() || secs < 0.0 {
        return Err(ProbeError::ParseError(format!(
            "Duration out of range: {}",
            secs
        )));
    }

    Ok(secs)
}

/// Fixed-duration probe, for hosts that already know durations.
#[derive(Debug, Clone, Copy)]
pub struct FixedDurationProbe(pub f64);

impl DurationProbe for FixedDurationProbe {
    fn duration_secs(&self, _path: &Path) -> Result<f64, ProbeError> {
        Ok(self.0)
    }
}
