//! Outbound queue events
//!
//! Observers receive these in production order through
//! [`crate::QueueManager::subscribe`].

use crate::admission::AdmissionResult;
use crate::item::{ItemProgress, ItemStatus, QueueItem};
use crate::runner::LogStream;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// The item list changed shape (add, remove, reorder, clear, rename).
    SnapshotChanged { items: Vec<QueueItem> },
    StatusChanged { id: String, status: ItemStatus },
    Progress { id: String, progress: ItemProgress },
    Log { id: String, stream: LogStream, line: String },
    Completed { id: String, output_path: PathBuf },
    Error { id: String, message: String },
    /// Items added during a run failed admission. Dispatch is paused after
    /// the active job until the queue is resumed.
    AdmissionBlocked { result: AdmissionResult },
    /// No pending items remain after a run.
    QueueCompleted,
}

impl QueueEvent {
    /// Item the event concerns, if any
    pub fn item_id(&self) -> Option<&str> {
        match self {
            QueueEvent::StatusChanged { id, .. }
            | QueueEvent::Progress { id, .. }
            | QueueEvent::Log { id, .. }
            | QueueEvent::Completed { id, .. }
            | QueueEvent::Error { id, .. } => Some(id),
            QueueEvent::SnapshotChanged { .. }
            | QueueEvent::AdmissionBlocked { .. }
            | QueueEvent::QueueCompleted => None,
        }
    }
}
