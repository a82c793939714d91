//! Queue item model.
//!
//! A [`QueueItem`] is one subtitle-burn encode: a video, the subtitle file to
//! burn into it, and where the result goes.

use crate::config::EncodingSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Status of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting to be dispatched.
    Pending,
    /// The encoder is running for this item.
    Processing,
    /// Held back from dispatch. Never assigned by the queue manager itself;
    /// pausing the queue leaves items `Pending`.
    Paused,
    /// Encode finished successfully.
    Completed,
    /// Encode failed; `error_message` says why.
    Error,
    /// Cancelled by the user before or during encoding.
    Cancelled,
}

impl Default for ItemStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ItemStatus {
    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Error | ItemStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "pending"),
            ItemStatus::Processing => write!(f, "processing"),
            ItemStatus::Paused => write!(f, "paused"),
            ItemStatus::Completed => write!(f, "completed"),
            ItemStatus::Error => write!(f, "error"),
            ItemStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Last-known encoder telemetry for an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemProgress {
    /// Frames encoded so far.
    pub frame: u64,
    /// Encoding rate in frames per second.
    pub fps: f64,
    /// Media time encoded so far, in seconds.
    pub time_secs: f64,
    /// Output bitrate in kbit/s, when reported.
    pub bitrate_kbps: Option<f64>,
    /// Speed relative to realtime, when reported.
    pub speed: Option<f64>,
    /// Completion percentage (0-100); 0 when the duration is unknown.
    pub percent: f64,
}

/// Caller-supplied description of a job to enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub video_path: PathBuf,
    pub subtitle_path: PathBuf,
    pub output_path: PathBuf,
}

impl NewItem {
    pub fn new(
        video_path: impl Into<PathBuf>,
        subtitle_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            video_path: video_path.into(),
            subtitle_path: subtitle_path.into(),
            output_path: output_path.into(),
        }
    }
}

/// One encode job in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique item identifier (UUID).
    pub id: String,
    pub video_path: PathBuf,
    pub subtitle_path: PathBuf,
    pub output_path: PathBuf,
    pub status: ItemStatus,
    /// Settings captured when the item was dispatched.
    pub settings_snapshot: Option<EncodingSettings>,
    pub progress: Option<ItemProgress>,
    /// Set only while `status == Error`.
    pub error_message: Option<String>,
    /// Unix timestamp (milliseconds) when the item was enqueued.
    pub created_at: i64,
    /// Unix timestamp (milliseconds) when encoding started.
    pub started_at: Option<i64>,
    /// Unix timestamp (milliseconds) when the item reached a terminal state.
    pub finished_at: Option<i64>,
}

impl QueueItem {
    /// Create a pending item with a fresh id.
    pub fn new(new_item: NewItem) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            video_path: new_item.video_path,
            subtitle_path: new_item.subtitle_path,
            output_path: new_item.output_path,
            status: ItemStatus::Pending,
            settings_snapshot: None,
            progress: None,
            error_message: None,
            created_at: current_timestamp_ms(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `Processing` with the given settings snapshot.
    pub fn start(&mut self, snapshot: EncodingSettings) {
        self.status = ItemStatus::Processing;
        self.settings_snapshot = Some(snapshot);
        self.progress = Some(ItemProgress::default());
        self.error_message = None;
        self.started_at = Some(current_timestamp_ms());
    }

    pub fn complete(&mut self) {
        self.status = ItemStatus::Completed;
        if let Some(progress) = self.progress.as_mut() {
            progress.percent = 100.0;
        }
        self.finished_at = Some(current_timestamp_ms());
    }

    pub fn fail(&mut self, message: &str) {
        self.status = ItemStatus::Error;
        self.error_message = Some(message.to_string());
        self.finished_at = Some(current_timestamp_ms());
    }

    pub fn cancel(&mut self) {
        self.status = ItemStatus::Cancelled;
        self.finished_at = Some(current_timestamp_ms());
    }

    /// Wall-clock run time in seconds, once the item has started.
    pub fn run_secs(&self, now_ms: i64) -> Option<f64> {
        let started = self.started_at?;
        let end = self.finished_at.unwrap_or(now_ms);
        Some((end - started).max(0) as f64 / 1000.0)
    }
}

/// Aggregate view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub paused: usize,
    pub completed: usize,
    pub error: usize,
    pub cancelled: usize,
    /// Whether dispatch is currently held by `pause()`.
    pub queue_paused: bool,
    /// Encode time spent so far, in seconds.
    pub elapsed_secs: f64,
    /// Estimate from the average completed-item duration; `None` until an
    /// item has completed.
    pub estimated_remaining_secs: Option<f64>,
}

/// Get current timestamp in milliseconds since Unix epoch.
pub(crate) fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
