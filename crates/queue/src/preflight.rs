//! Tool preflight checks
//!
//! Verifies the external tools before a queue is started:
//! - `ffmpeg -version` runs and reports a parseable version
//! - `ffprobe -version` runs
//! - with GPU acceleration on, `ffmpeg -encoders` lists the NVENC encoder

use crate::config::Config;
use crate::encode::ffmpeg::GPU_CODEC;
use std::process::Command;
use thiserror::Error;

/// Error types for preflight checks
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("ffmpeg not available: {0}")]
    FfmpegUnavailable(String),

    #[error("ffprobe not available: {0}")]
    FfprobeUnavailable(String),

    #[error("GPU encoder not available: {0}")]
    GpuEncoderUnavailable(String),
}

/// Parse the version from `ffmpeg -version` output.
///
/// Handles `ffmpeg version 6.1.1 ...`, n-prefixed builds (`n7.0-...`) and
/// git snapshots (`N-113465-g...`, reported as the snapshot string).
pub fn parse_ffmpeg_version(version_output: &str) -> Option<String> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let version = version_line
        .to_lowercase()
        .split("ffmpeg version")
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    let version = version.strip_prefix('n').unwrap_or(&version);
    if version.is_empty() {
        return None;
    }
    Some(version.to_string())
}

/// Whether `ffmpeg -encoders` output lists `encoder`
pub fn encoders_list_contains(encoders_output: &str, encoder: &str) -> bool {
    encoders_output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|name| name == encoder)
}

fn run_tool(program: &str, args: &[&str]) -> Result<String, String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| format!("{} {} failed; is it installed and in PATH? Error: {}", program, args.join(" "), e))?;

    if !output.status.success() {
        return Err(format!("{} {} exited with {}", program, args.join(" "), output.status));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Check that ffmpeg runs and return its version
pub fn check_ffmpeg(ffmpeg_path: &str) -> Result<String, PreflightError> {
    let output = run_tool(ffmpeg_path, &["-version"]).map_err(PreflightError::FfmpegUnavailable)?;
    parse_ffmpeg_version(&output).ok_or_else(|| {
        PreflightError::FfmpegUnavailable(format!(
            "Could not parse ffmpeg version from output: {}",
            output.lines().next().unwrap_or("(empty)")
        ))
    })
}

pub fn check_ffprobe(ffprobe_path: &str) -> Result<(), PreflightError> {
    run_tool(ffprobe_path, &["-version"]).map_err(PreflightError::FfprobeUnavailable)?;
    Ok(())
}

pub fn check_gpu_encoder(ffmpeg_path: &str) -> Result<(), PreflightError> {
    let output = run_tool(ffmpeg_path, &["-hide_banner", "-encoders"])
        .map_err(PreflightError::GpuEncoderUnavailable)?;
    if !encoders_list_contains(&output, GPU_CODEC) {
        return Err(PreflightError::GpuEncoderUnavailable(format!(
            "{} does not list {}; disable GPU acceleration or install an NVENC-enabled build",
            ffmpeg_path, GPU_CODEC
        )));
    }
    Ok(())
}

/// Run all preflight checks in order, returning the ffmpeg version
pub fn run_preflight_checks(cfg: &Config) -> Result<String, PreflightError> {
    let version = check_ffmpeg(&cfg.encoder.ffmpeg_path)?;
    check_ffprobe(&cfg.encoder.ffprobe_path)?;
    if cfg.encoding.gpu_acceleration {
        check_gpu_encoder(&cfg.encoder.ffmpeg_path)?;
    }
    tracing::info!(ffmpeg_version = %version, "preflight checks passed");
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_standard_version() {
        let output = "ffmpeg version 6.1.1 Copyright (c) 2000-2023 the FFmpeg developers\nbuilt with gcc 13.2.0";
        assert_eq!(parse_ffmpeg_version(output), Some("6.1.1".to_string()));
    }

    #[test]
    fn test_parse_n_prefixed_version() {
        let output = "ffmpeg version n7.0-2-g1234abcd Copyright (c) 2000-2024";
        assert_eq!(parse_ffmpeg_version(output), Some("7.0-2-g1234abcd".to_string()));
    }

    #[test]
    fn test_parse_missing_version() {
        assert_eq!(parse_ffmpeg_version("command not found"), None);
        assert_eq!(parse_ffmpeg_version(""), None);
        assert_eq!(parse_ffmpeg_version("ffmpeg version"), None);
    }

    #[test]
    fn test_encoders_list() {
        let output = "Encoders:\n V..... = Video\n ------\n V....D libx264              libx264 H.264 / AVC\n V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)\n A....D aac                  AAC (Advanced Audio Coding)";
        assert!(encoders_list_contains(output, "h264_nvenc"));
        assert!(encoders_list_contains(output, "libx264"));
        assert!(!encoders_list_contains(output, "hevc_nvenc"));
        // Description text must not match
        assert!(!encoders_list_contains(output, "NVIDIA"));
    }

    #[test]
    fn test_missing_binary_is_reported() {
        let err = check_ffmpeg("/nonexistent/path/to/ffmpeg").unwrap_err();
        assert!(matches!(err, PreflightError::FfmpegUnavailable(_)));
        let err = check_ffprobe("/nonexistent/path/to/ffprobe").unwrap_err();
        assert!(matches!(err, PreflightError::FfprobeUnavailable(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_parse_version_roundtrip(
            major in 1u32..20,
            minor in 0u32..10,
            prefixed in proptest::bool::ANY,
        ) {
            let prefix = if prefixed { "n" } else { "" };
            let output = format!("ffmpeg version {}{}.{} Copyright (c) 2000-2024", prefix, major, minor);
            prop_assert_eq!(parse_ffmpeg_version(&output), Some(format!("{}.{}", major, minor)));
        }
    }
}
