//! CLI entry point for subburn
//!
//! Builds a queue from the command line, starts it, logs progress until the
//! queue drains, and cancels everything on Ctrl-C.

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use subburn_queue::{
    derive_output_path, new_shared_settings, run_preflight_checks, run_status_server, scan_pairs,
    AdmissionResult, Collaborators, Config, ConflictStrategy, ItemStatus, NewItem, QualityMode,
    QueueEvent, QueueManager, SettingsPatch, StartOptions, StartOutcome,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnConflict {
    AutoRename,
    Overwrite,
    Cancel,
}

impl From<OnConflict> for ConflictStrategy {
    fn from(value: OnConflict) -> Self {
        match value {
            OnConflict::AutoRename => ConflictStrategy::AutoRename,
            OnConflict::Overwrite => ConflictStrategy::Overwrite,
            OnConflict::Cancel => ConflictStrategy::Cancel,
        }
    }
}

/// subburn - burn subtitles into videos with ffmpeg, one job at a time
#[derive(Parser, Debug)]
#[command(name = "subburn")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Video and subtitle to burn together (repeatable)
    #[arg(long, num_args = 2, value_names = ["VIDEO", "SUBTITLE"], action = ArgAction::Append)]
    pair: Vec<PathBuf>,

    /// Directory to scan for video/subtitle pairs
    #[arg(long)]
    scan: Option<PathBuf>,

    /// Write outputs here instead of next to each video
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// What to do when an output file already exists
    #[arg(long, value_enum)]
    on_conflict: Option<OnConflict>,

    /// Start even if the estimate says the disk is too small
    #[arg(long, default_value = "false")]
    force_space: bool,

    /// Override the quality mode (bitrate, constant_quality)
    #[arg(long)]
    quality_mode: Option<QualityMode>,

    /// Override the target bitrate in kbps
    #[arg(long)]
    bitrate: Option<u32>,

    /// Override the constant-quality value
    #[arg(long)]
    cq: Option<u8>,

    /// Use the NVENC encoder
    #[arg(long, overrides_with = "no_gpu")]
    gpu: bool,

    /// Use the software encoder even if the config enables NVENC
    #[arg(long, overrides_with = "gpu")]
    no_gpu: bool,

    /// Serve queue status over HTTP at the configured address
    #[arg(long, default_value = "false")]
    status_server: bool,

    /// Skip ffmpeg/ffprobe preflight checks. For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

impl Args {
    /// Settings overrides given on the command line
    fn settings_patch(&self) -> SettingsPatch {
        let gpu_acceleration = match (self.gpu, self.no_gpu) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        SettingsPatch {
            quality_mode: self.quality_mode,
            bitrate_kbps: self.bitrate,
            cq: self.cq,
            gpu_acceleration,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(config = %args.config.display(), error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if args.skip_checks {
        tracing::warn!("skipping preflight checks (--skip-checks enabled)");
    } else if let Err(e) = run_preflight_checks(&config) {
        tracing::error!(error = %e, "preflight check failed");
        return ExitCode::FAILURE;
    }

    let mut items: Vec<NewItem> = args
        .pair
        .chunks(2)
        .filter(|chunk| chunk.len() == 2)
        .map(|chunk| {
            NewItem::new(
                chunk[0].clone(),
                chunk[1].clone(),
                derive_output_path(&chunk[0], args.output_dir.as_deref()),
            )
        })
        .collect();
    if let Some(root) = &args.scan {
        items.extend(scan_pairs(root, args.output_dir.as_deref()));
    }
    if items.is_empty() {
        tracing::error!("nothing to encode; pass --pair VIDEO SUBTITLE or --scan DIR");
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::error!(dir = %dir.display(), error = %e, "failed to create output directory");
            return ExitCode::FAILURE;
        }
    }

    let settings = new_shared_settings(config.encoding.clone());
    let manager = QueueManager::new(
        Collaborators::system(&config),
        settings,
        &config.admission,
    );

    if args.status_server || config.status_server.enabled {
        let server_manager = manager.clone();
        let bind_addr = config.status_server.bind_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = run_status_server(server_manager, &bind_addr).await {
                tracing::error!(error = %e, "status server error");
            }
        });
    }

    match run(&manager, &args, items).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "queue error");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    manager: &QueueManager,
    args: &Args,
    items: Vec<NewItem>,
) -> Result<ExitCode, subburn_queue::QueueError> {
    let patch = args.settings_patch();
    if patch != SettingsPatch::default() {
        manager.update_settings(patch).await?;
    }

    let mut events = manager.subscribe().await?;
    let added = manager.add_many(items).await?;
    tracing::info!(count = added.len(), "queued");

    let options = StartOptions {
        on_conflict: args.on_conflict.map(Into::into),
        force_space: args.force_space,
    };
    match manager.start(options).await? {
        StartOutcome::Started => {}
        StartOutcome::NothingToDo => return Ok(ExitCode::SUCCESS),
        StartOutcome::Blocked(result) => {
            report_blocked(&result);
            return Ok(ExitCode::FAILURE);
        }
    }

    tokio::select! {
        _ = drain_events(&mut events) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, cancelling queue");
            manager.cancel_all().await?;
            return Ok(ExitCode::from(130));
        }
    }

    let stats = manager.get_stats().await?;
    tracing::info!(
        completed = stats.completed,
        failed = stats.error,
        cancelled = stats.cancelled,
        elapsed_secs = stats.elapsed_secs,
        "queue finished"
    );

    if stats.error > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Log events until the queue reports it has drained.
async fn drain_events(events: &mut mpsc::UnboundedReceiver<QueueEvent>) {
    let mut last_decile: Option<u8> = None;
    while let Some(event) = events.recv().await {
        match event {
            QueueEvent::StatusChanged { id, status } => {
                if status == ItemStatus::Processing {
                    last_decile = None;
                }
                tracing::info!(item_id = %id, %status, "status changed");
            }
            QueueEvent::Progress { id, progress } => {
                let decile = (progress.percent / 10.0).floor() as u8;
                if last_decile != Some(decile) {
                    last_decile = Some(decile);
                    tracing::info!(
                        item_id = %id,
                        percent = format_args!("{:.1}", progress.percent),
                        fps = progress.fps,
                        speed = ?progress.speed,
                        "progress"
                    );
                }
            }
            QueueEvent::Log { id, stream, line } => {
                tracing::trace!(item_id = %id, ?stream, "{}", line);
            }
            QueueEvent::Completed { id, output_path } => {
                tracing::info!(item_id = %id, output = %output_path.display(), "encode finished");
            }
            QueueEvent::Error { id, message } => {
                tracing::error!(item_id = %id, %message, "encode failed");
            }
            QueueEvent::AdmissionBlocked { result } => {
                report_blocked(&result);
                tracing::warn!("queue paused after the active job");
            }
            QueueEvent::SnapshotChanged { .. } => {}
            QueueEvent::QueueCompleted => return,
        }
    }
}

fn report_blocked(result: &AdmissionResult) {
    match result {
        AdmissionResult::ConflictsFound { conflicts } => {
            for conflict in conflicts {
                tracing::error!(
                    item_id = %conflict.item_id,
                    path = %conflict.existing_path.display(),
                    "output already exists"
                );
            }
            tracing::error!("rerun with --on-conflict auto-rename or --on-conflict overwrite");
        }
        AdmissionResult::InsufficientSpace { report } => {
            tracing::error!(
                volume = %report.volume_label,
                required = report.required,
                available = report.available,
                "not enough disk space; rerun with --force-space to start anyway"
            );
        }
        AdmissionResult::Clear => {}
    }
}
