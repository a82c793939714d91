//! Queue Manager
//!
//! A single actor task owns the item list, the pause flag and the active run.
//! [`QueueManager`] is a cloneable handle that sends it commands over an mpsc
//! channel and awaits oneshot replies, so every mutation, admission check and
//! dispatch is serialized. Runner events are forwarded into the same inbox.
//!
//! The actor stops once every handle is dropped and no run is in flight.

use crate::admission::{AdmissionController, AdmissionOverrides, AdmissionResult};
use crate::config::{AdmissionConfig, Config, EncodingSettings, SettingsPatch};
use crate::conflict::{self, ConflictStrategy};
use crate::disk_space::DiskSpaceEstimator;
use crate::encode::{CommandFactory, EncodeJob, FfmpegCommandFactory};
use crate::events::QueueEvent;
use crate::filesystem::{Filesystem, LocalFilesystem};
use crate::item::{current_timestamp_ms, ItemStatus, NewItem, QueueItem, QueueStats};
use crate::probe::{DurationProbe, FfprobeDurationProbe};
use crate::runner::{self, RunHandle, RunOutcome, RunnerEvent};
use crate::state::QueueState;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};

const COMMAND_BUFFER: usize = 64;

/// Global encoding settings, owned by the host and read by the manager at
/// dispatch time
pub type SharedSettings = Arc<RwLock<EncodingSettings>>;

pub fn new_shared_settings(settings: EncodingSettings) -> SharedSettings {
    Arc::new(RwLock::new(settings))
}

/// Error type for queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    /// Bad input to add or update; the queue is unchanged
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    /// The operation would break a queue invariant; the queue is unchanged
    #[error("Operation not allowed: {0}")]
    InvariantViolation(String),

    #[error("Index out of range (from {from}, to {to}, length {len})")]
    InvalidIndex { from: usize, to: usize, len: usize },

    /// The actor task has stopped
    #[error("Queue manager is not running")]
    ManagerUnavailable,

    /// A blocking task panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),
}

/// External services the manager depends on
#[derive(Clone)]
pub struct Collaborators {
    pub filesystem: Arc<dyn Filesystem>,
    pub probe: Arc<dyn DurationProbe>,
    pub encoder: Arc<dyn CommandFactory>,
}

impl Collaborators {
    /// Local disk, ffprobe and ffmpeg as configured
    pub fn system(config: &Config) -> Self {
        Self {
            filesystem: Arc::new(LocalFilesystem::new()),
            probe: Arc::new(FfprobeDurationProbe::new(config.encoder.ffprobe_path.clone())),
            encoder: Arc::new(FfmpegCommandFactory::new(config.encoder.ffmpeg_path.clone())),
        }
    }
}

/// Options for `start` and `resume`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// How to handle existing outputs. `None` reports them instead.
    pub on_conflict: Option<ConflictStrategy>,
    /// Proceed past an insufficient-space finding.
    pub force_space: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// Admission passed and dispatch is running.
    Started,
    /// No pending items.
    NothingToDo,
    /// Admission stopped the start; nothing new was dispatched.
    Blocked(AdmissionResult),
}

type Reply<T> = oneshot::Sender<Result<T, QueueError>>;

enum Command {
    Add(Vec<NewItem>, Reply<Vec<QueueItem>>),
    Remove(String, Reply<QueueItem>),
    Reorder(usize, usize, Reply<()>),
    Clear(Reply<usize>),
    Start(StartOptions, Reply<StartOutcome>),
    Pause(Reply<()>),
    CancelAll(Reply<()>),
    UpdateSettings(SettingsPatch, Reply<EncodingSettings>),
    UpdateItemOutput(String, PathBuf, Reply<QueueItem>),
    GetAll(Reply<Vec<QueueItem>>),
    GetStats(Reply<QueueStats>),
    Subscribe(Reply<mpsc::UnboundedReceiver<QueueEvent>>),
    Runner { id: String, event: RunnerEvent },
}

/// Handle to the queue actor
#[derive(Clone)]
pub struct QueueManager {
    tx: mpsc::Sender<Command>,
}

impl QueueManager {
    /// Spawn the actor. Must be called from within a tokio runtime.
    pub fn new(
        collaborators: Collaborators,
        settings: SharedSettings,
        admission: &AdmissionConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let estimator = DiskSpaceEstimator::new(collaborators.filesystem.clone(), admission);
        let admission = AdmissionController::new(
            collaborators.filesystem.clone(),
            collaborators.probe.clone(),
            estimator,
        );

        let actor = QueueActor {
            state: QueueState::new(),
            collaborators,
            admission,
            settings,
            inbox: tx.downgrade(),
            subscribers: Vec::new(),
            active: None,
            running: false,
            paused: false,
            run_options: StartOptions::default(),
        };
        tokio::spawn(actor.run(rx));

        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, QueueError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| QueueError::ManagerUnavailable)?;
        rx.await.map_err(|_| QueueError::ManagerUnavailable)?
    }

    /// Append one item.
    pub async fn add(&self, item: NewItem) -> Result<QueueItem, QueueError> {
        let mut added = self.add_many(vec![item]).await?;
        added
            .pop()
            .ok_or_else(|| QueueError::Internal("add returned no item".to_string()))
    }

    /// Append a batch. Either every item is valid and added, or none is.
    pub async fn add_many(&self, items: Vec<NewItem>) -> Result<Vec<QueueItem>, QueueError> {
        self.request(|reply| Command::Add(items, reply)).await
    }

    pub async fn remove(&self, id: &str) -> Result<QueueItem, QueueError> {
        let id = id.to_string();
        self.request(|reply| Command::Remove(id, reply)).await
    }

    pub async fn reorder(&self, from: usize, to: usize) -> Result<(), QueueError> {
        self.request(|reply| Command::Reorder(from, to, reply)).await
    }

    /// Remove every item except the processing one.
    pub async fn clear(&self) -> Result<usize, QueueError> {
        self.request(Command::Clear).await
    }

    /// Admit all pending items and begin dispatching them in order.
    ///
    /// Returns once admission has finished; encoding continues in the
    /// background.
    pub async fn start(&self, options: StartOptions) -> Result<StartOutcome, QueueError> {
        self.request(|reply| Command::Start(options, reply)).await
    }

    /// Same as [`QueueManager::start`]; pending items are re-admitted.
    pub async fn resume(&self, options: StartOptions) -> Result<StartOutcome, QueueError> {
        self.start(options).await
    }

    /// Stop dispatching after the active job. The active job is not touched.
    pub async fn pause(&self) -> Result<(), QueueError> {
        self.request(Command::Pause).await
    }

    /// Kill the active job (waiting for it to exit) and cancel everything
    /// still pending.
    pub async fn cancel_all(&self) -> Result<(), QueueError> {
        self.request(Command::CancelAll).await
    }

    /// Merge `patch` into the global settings. Jobs already dispatched keep
    /// their snapshot.
    pub async fn update_settings(
        &self,
        patch: SettingsPatch,
    ) -> Result<EncodingSettings, QueueError> {
        self.request(|reply| Command::UpdateSettings(patch, reply)).await
    }

    pub async fn update_item_output(
        &self,
        id: &str,
        output_path: impl Into<PathBuf>,
    ) -> Result<QueueItem, QueueError> {
        let id = id.to_string();
        let output_path = output_path.into();
        self.request(|reply| Command::UpdateItemOutput(id, output_path, reply))
            .await
    }

    pub async fn get_all(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.request(Command::GetAll).await
    }

    pub async fn get_stats(&self) -> Result<QueueStats, QueueError> {
        self.request(Command::GetStats).await
    }

    /// Receive every event emitted from now on, in order.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<QueueEvent>, QueueError> {
        self.request(Command::Subscribe).await
    }
}

struct QueueActor {
    state: QueueState,
    collaborators: Collaborators,
    admission: AdmissionController,
    settings: SharedSettings,
    /// Weak so that dropping every handle lets the actor stop
    inbox: mpsc::WeakSender<Command>,
    subscribers: Vec<mpsc::UnboundedSender<QueueEvent>>,
    active: Option<RunHandle>,
    /// A start was admitted and pending items should be dispatched
    running: bool,
    paused: bool,
    /// Options given to the start that began this run
    run_options: StartOptions,
}

impl QueueActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        tracing::debug!("queue manager started");
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
        }
        if let Some(handle) = self.active.take() {
            handle.cancel().await;
        }
        tracing::debug!("queue manager stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Add(items, reply) => {
                let _ = reply.send(self.add(items).await);
            }
            Command::Remove(id, reply) => {
                let result = self.state.remove(&id);
                if result.is_ok() {
                    tracing::debug!(item_id = %id, "item removed");
                    self.emit_snapshot();
                }
                let _ = reply.send(result);
            }
            Command::Reorder(from, to, reply) => {
                let result = self.state.reorder(from, to);
                if result.is_ok() {
                    self.emit_snapshot();
                }
                let _ = reply.send(result);
            }
            Command::Clear(reply) => {
                let removed = self.state.clear();
                if removed > 0 {
                    tracing::info!(removed, "queue cleared");
                    self.emit_snapshot();
                }
                let _ = reply.send(Ok(removed));
            }
            Command::Start(options, reply) => {
                let _ = reply.send(self.start(options).await);
            }
            Command::Pause(reply) => {
                if !self.paused {
                    tracing::info!("queue paused, active job will finish");
                }
                self.paused = true;
                let _ = reply.send(Ok(()));
            }
            Command::CancelAll(reply) => {
                self.cancel_all().await;
                let _ = reply.send(Ok(()));
            }
            Command::UpdateSettings(patch, reply) => {
                let _ = reply.send(self.update_settings(patch).await);
            }
            Command::UpdateItemOutput(id, path, reply) => {
                let _ = reply.send(self.update_item_output(&id, path));
            }
            Command::GetAll(reply) => {
                let _ = reply.send(Ok(self.state.items().to_vec()));
            }
            Command::GetStats(reply) => {
                let stats = self.state.stats(self.paused, current_timestamp_ms());
                let _ = reply.send(Ok(stats));
            }
            Command::Subscribe(reply) => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.subscribers.push(tx);
                let _ = reply.send(Ok(rx));
            }
            Command::Runner { id, event } => self.on_runner_event(id, event).await,
        }
    }

    fn emit(&mut self, event: QueueEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn emit_snapshot(&mut self) {
        let items = self.state.items().to_vec();
        self.emit(QueueEvent::SnapshotChanged { items });
    }

    fn emit_status(&mut self, id: &str, status: ItemStatus) {
        self.emit(QueueEvent::StatusChanged {
            id: id.to_string(),
            status,
        });
    }

    async fn add(&mut self, items: Vec<NewItem>) -> Result<Vec<QueueItem>, QueueError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let fs = self.collaborators.filesystem.clone();
        let items = blocking(move || {
            for item in &items {
                validate_new_item(item, fs.as_ref())?;
            }
            Ok::<_, QueueError>(items)
        })
        .await??;

        let added: Vec<QueueItem> = items.into_iter().map(QueueItem::new).collect();
        tracing::info!(count = added.len(), "items added");
        self.state.push_all(added.clone());
        self.emit_snapshot();

        if self.running && !self.paused {
            self.readmit_during_run().await;
        }
        Ok(added)
    }

    /// Admit the pending set again after items were added to a live run.
    ///
    /// The run's own options apply. A blocked result pauses dispatch after
    /// the active job and is reported as an event.
    async fn readmit_during_run(&mut self) {
        let pending = self.state.pending();
        match self.admit_pending(pending, self.run_options).await {
            Ok(AdmissionResult::Clear) => self.dispatch_next().await,
            Ok(result) => {
                tracing::warn!("items added during the run failed admission, pausing queue");
                self.paused = true;
                self.emit(QueueEvent::AdmissionBlocked { result });
            }
            Err(e) => {
                tracing::error!(error = %e, "admission of added items failed, pausing queue");
                self.paused = true;
            }
        }
    }

    async fn start(&mut self, options: StartOptions) -> Result<StartOutcome, QueueError> {
        self.paused = false;

        let pending = self.state.pending();
        if pending.is_empty() {
            if self.active.is_none() {
                self.running = false;
            }
            return Ok(StartOutcome::NothingToDo);
        }

        let result = self.admit_pending(pending, options).await?;
        if !result.is_clear() {
            if self.active.is_some() {
                // Hold dispatch so nothing unadmitted starts after the active job
                self.paused = true;
            } else {
                self.running = false;
            }
            return Ok(StartOutcome::Blocked(result));
        }

        tracing::info!(pending = self.state.pending().len(), "queue started");
        self.running = true;
        self.run_options = options;
        self.dispatch_next().await;
        Ok(StartOutcome::Started)
    }

    /// Admit `pending`, resolving conflicts with the strategy in `options`.
    async fn admit_pending(
        &mut self,
        pending: Vec<QueueItem>,
        options: StartOptions,
    ) -> Result<AdmissionResult, QueueError> {
        let settings = self.settings.read().await.clone();
        let mut overrides = AdmissionOverrides {
            accept_overwrite: false,
            force_space: options.force_space,
        };
        let mut result = self.admit(pending.clone(), &settings, overrides).await?;

        let conflict_count = match &result {
            AdmissionResult::ConflictsFound { conflicts } => Some(conflicts.len()),
            _ => None,
        };
        if let Some(count) = conflict_count {
            match options.on_conflict {
                Some(ConflictStrategy::AutoRename) => {
                    tracing::info!(count, "renaming conflicting outputs");
                    let renamed = self.auto_rename(pending).await?;
                    result = self.admit(renamed, &settings, overrides).await?;
                }
                Some(ConflictStrategy::Overwrite) => {
                    tracing::info!(count, "overwriting existing outputs");
                    overrides.accept_overwrite = true;
                    result = self.admit(pending, &settings, overrides).await?;
                }
                Some(ConflictStrategy::Cancel) | None => {}
            }
        }
        Ok(result)
    }

    /// The processing item, if any, counts toward the space requirement.
    async fn admit(
        &self,
        items: Vec<QueueItem>,
        settings: &EncodingSettings,
        overrides: AdmissionOverrides,
    ) -> Result<AdmissionResult, QueueError> {
        let admission = self.admission.clone();
        let in_flight: Vec<QueueItem> = self.state.processing().cloned().into_iter().collect();
        let settings = settings.clone();
        blocking(move || admission.admit_alongside(&items, &in_flight, &settings, overrides)).await
    }

    /// Rename conflicting outputs of `pending` and write them back.
    async fn auto_rename(&mut self, pending: Vec<QueueItem>) -> Result<Vec<QueueItem>, QueueError> {
        let pending_ids: HashSet<String> = pending.iter().map(|item| item.id.clone()).collect();
        let reserved: HashSet<PathBuf> = self
            .state
            .items()
            .iter()
            .filter(|item| !pending_ids.contains(&item.id))
            .filter(|item| !matches!(item.status, ItemStatus::Error | ItemStatus::Cancelled))
            .map(|item| item.output_path.clone())
            .collect();

        let fs = self.collaborators.filesystem.clone();
        let resolved = blocking(move || {
            conflict::resolve(&pending, ConflictStrategy::AutoRename, fs.as_ref(), &reserved)
        })
        .await?;

        for renamed in &resolved {
            if let Some(item) = self.state.get_mut(&renamed.id) {
                item.output_path = renamed.output_path.clone();
            }
        }
        self.emit_snapshot();
        Ok(resolved)
    }

    async fn cancel_all(&mut self) {
        self.running = false;
        self.paused = false;
        self.run_options = StartOptions::default();

        if let Some(handle) = self.active.take() {
            let id = handle.item_id().to_string();
            handle.cancel().await;
            if let Some(item) = self.state.get_mut(&id) {
                if item.status == ItemStatus::Processing {
                    item.cancel();
                    self.emit_status(&id, ItemStatus::Cancelled);
                }
            }
        }

        let cancelled = self.state.cancel_pending();
        for id in &cancelled {
            self.emit_status(id, ItemStatus::Cancelled);
        }
        tracing::info!(cancelled = cancelled.len(), "queue cancelled");
    }

    async fn update_settings(
        &mut self,
        patch: SettingsPatch,
    ) -> Result<EncodingSettings, QueueError> {
        if patch.bitrate_kbps == Some(0) {
            return Err(QueueError::Validation(
                "bitrate_kbps must be greater than 0".to_string(),
            ));
        }
        let mut settings = self.settings.write().await;
        settings.apply(&patch);
        tracing::info!(settings = ?*settings, "encoding settings updated");
        Ok(settings.clone())
    }

    fn update_item_output(&mut self, id: &str, path: PathBuf) -> Result<QueueItem, QueueError> {
        if path.as_os_str().is_empty() {
            return Err(QueueError::Validation("output path is empty".to_string()));
        }
        let item = self
            .state
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if item.status != ItemStatus::Pending {
            return Err(QueueError::InvariantViolation(format!(
                "item {} is {} and its output can no longer change",
                id, item.status
            )));
        }
        item.output_path = path;
        let updated = item.clone();
        self.emit_snapshot();
        Ok(updated)
    }

    async fn on_runner_event(&mut self, id: String, event: RunnerEvent) {
        let is_active = self
            .active
            .as_ref()
            .is_some_and(|handle| handle.item_id() == id);
        if !is_active {
            tracing::trace!(item_id = %id, "dropping event for inactive item");
            return;
        }

        match event {
            RunnerEvent::Progress(progress) => {
                if let Some(item) = self.state.get_mut(&id) {
                    item.progress = Some(progress.clone());
                }
                self.emit(QueueEvent::Progress { id, progress });
            }
            RunnerEvent::Log { stream, line } => {
                tracing::trace!(item_id = %id, ?stream, %line, "encoder output");
                self.emit(QueueEvent::Log { id, stream, line });
            }
            RunnerEvent::Finished(outcome) => {
                self.active = None;
                self.finish_item(&id, outcome);
                self.dispatch_next().await;
            }
        }
    }

    fn finish_item(&mut self, id: &str, outcome: RunOutcome) {
        let Some(item) = self.state.get_mut(id) else {
            return;
        };
        match outcome {
            RunOutcome::Completed { output_path } => {
                item.complete();
                self.emit_status(id, ItemStatus::Completed);
                self.emit(QueueEvent::Completed {
                    id: id.to_string(),
                    output_path,
                });
            }
            RunOutcome::Failed { message } => {
                item.fail(&message);
                self.emit_status(id, ItemStatus::Error);
                self.emit(QueueEvent::Error {
                    id: id.to_string(),
                    message,
                });
            }
            RunOutcome::Cancelled => {
                item.cancel();
                self.emit_status(id, ItemStatus::Cancelled);
            }
        }
    }

    /// Start the next pending item if the queue is running and idle.
    async fn dispatch_next(&mut self) {
        if self.active.is_some() || !self.running || self.paused {
            return;
        }

        loop {
            let Some(next) = self.state.next_pending().cloned() else {
                self.running = false;
                self.run_options = StartOptions::default();
                tracing::info!("queue completed");
                self.emit(QueueEvent::QueueCompleted);
                return;
            };

            let id = next.id.clone();
            match self.launch(next).await {
                Ok(()) => return,
                Err(message) => {
                    tracing::warn!(item_id = %id, %message, "failed to start encode");
                    if let Some(item) = self.state.get_mut(&id) {
                        item.fail(&message);
                    }
                    self.emit_status(&id, ItemStatus::Error);
                    self.emit(QueueEvent::Error { id, message });
                }
            }
        }
    }

    /// Prepare and spawn one item. On error the caller fails the item.
    async fn launch(&mut self, item: QueueItem) -> Result<(), String> {
        let output_path = self
            .recheck_output(&item)
            .await
            .map_err(|e| e.to_string())?;
        if output_path != item.output_path {
            if let Some(stored) = self.state.get_mut(&item.id) {
                stored.output_path = output_path.clone();
            }
            self.emit_snapshot();
        }

        let snapshot = self.settings.read().await.clone();
        let probe = self.collaborators.probe.clone();
        let video = item.video_path.clone();
        let duration_secs = match blocking(move || probe.duration_secs(&video))
            .await
            .map_err(|e| e.to_string())?
        {
            Ok(secs) => Some(secs),
            Err(e) => {
                tracing::debug!(item_id = %item.id, error = %e, "duration unknown");
                None
            }
        };

        let job = EncodeJob {
            item_id: item.id.clone(),
            video_path: item.video_path.clone(),
            subtitle_path: item.subtitle_path.clone(),
            output_path,
            settings: snapshot.clone(),
            duration_secs,
        };

        if let Some(stored) = self.state.get_mut(&item.id) {
            stored.start(snapshot);
        }
        self.emit_status(&item.id, ItemStatus::Processing);

        match runner::run(job, self.collaborators.encoder.as_ref()) {
            Ok((handle, events)) => {
                tracing::info!(item_id = %item.id, "item dispatched");
                self.active = Some(handle);
                self.forward(item.id, events);
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Output path to use right before dispatch.
    ///
    /// A target that appeared on disk since admission, or that an earlier
    /// item already wrote, is renamed. A run started with the overwrite
    /// strategy keeps targets that only exist on disk.
    async fn recheck_output(&self, item: &QueueItem) -> Result<PathBuf, QueueError> {
        let fs = self.collaborators.filesystem.clone();
        let committed = self.state.committed_outputs(&item.id);
        let claimed = self.state.claimed_outputs(&item.id);
        let overwrite = self.run_options.on_conflict == Some(ConflictStrategy::Overwrite);
        let path = item.output_path.clone();
        let id = item.id.clone();

        blocking(move || {
            let on_disk = fs.exists(&path);
            let taken = committed.contains(&path);
            if (!on_disk && !taken) || (on_disk && !taken && overwrite) {
                return path;
            }
            let renamed = conflict::next_free_path(&path, fs.as_ref(), &claimed);
            tracing::info!(
                item_id = %id,
                from = %path.display(),
                to = %renamed.display(),
                "output taken at dispatch, renaming"
            );
            renamed
        })
        .await
    }

    fn forward(&self, id: String, mut events: mpsc::UnboundedReceiver<RunnerEvent>) {
        let Some(inbox) = self.inbox.upgrade() else {
            tracing::debug!(item_id = %id, "queue manager shutting down, events not forwarded");
            return;
        };
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let command = Command::Runner {
                    id: id.clone(),
                    event,
                };
                if inbox.send(command).await.is_err() {
                    break;
                }
            }
        });
    }
}

fn validate_new_item(item: &NewItem, fs: &dyn Filesystem) -> Result<(), QueueError> {
    for (label, path) in [
        ("video", &item.video_path),
        ("subtitle", &item.subtitle_path),
        ("output", &item.output_path),
    ] {
        if path.as_os_str().is_empty() {
            return Err(QueueError::Validation(format!("{} path is empty", label)));
        }
    }
    if !fs.exists(&item.video_path) {
        return Err(QueueError::Validation(format!(
            "video file not found: {}",
            item.video_path.display()
        )));
    }
    if !fs.exists(&item.subtitle_path) {
        return Err(QueueError::Validation(format!(
            "subtitle file not found: {}",
            item.subtitle_path.display()
        )));
    }
    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T, QueueError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| QueueError::Internal(format!("blocking task failed: {}", e)))
}
