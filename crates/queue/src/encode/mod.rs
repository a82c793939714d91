//! Encoder command construction

pub mod ffmpeg;

pub use ffmpeg::{build_ffmpeg_args, CommandFactory, EncodeJob, FfmpegCommandFactory};
