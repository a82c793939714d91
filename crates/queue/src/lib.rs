//! Subtitle-burn encoding queue
//!
//! Ordered queue of ffmpeg subtitle-burn jobs with admission checks (output
//! conflicts, disk space), a supervised single-process runner, and an event
//! stream for observers.

pub mod admission;
pub mod conflict;
pub mod disk_space;
pub mod encode;
pub mod events;
pub mod filesystem;
pub mod item;
pub mod manager;
pub mod preflight;
pub mod probe;
pub mod progress;
pub mod runner;
pub mod scan;
pub mod state;
pub mod status_server;

pub use subburn_config as config;
pub use subburn_config::{Config, EncodingSettings, QualityMode, SettingsPatch};
pub use admission::{AdmissionController, AdmissionOverrides, AdmissionResult};
pub use conflict::{ConflictReport, ConflictStrategy};
pub use disk_space::{DiskSpaceEstimator, DiskSpaceReport};
pub use encode::{build_ffmpeg_args, CommandFactory, EncodeJob, FfmpegCommandFactory};
pub use events::QueueEvent;
pub use filesystem::{Filesystem, LocalFilesystem, VolumeSpace};
pub use item::{ItemProgress, ItemStatus, NewItem, QueueItem, QueueStats};
pub use manager::{
    new_shared_settings, Collaborators, QueueError, QueueManager, SharedSettings, StartOptions,
    StartOutcome,
};
pub use preflight::{parse_ffmpeg_version, run_preflight_checks, PreflightError};
pub use probe::{DurationProbe, FfprobeDurationProbe, FixedDurationProbe, ProbeError};
pub use runner::{LogStream, RunHandle, RunOutcome, RunnerError, RunnerEvent};
pub use scan::{derive_output_path, scan_pairs};
pub use status_server::{create_status_router, run_status_server, ServerError};
