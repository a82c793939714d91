//! Admission Controller
//!
//! Pre-dispatch gate for a batch: output conflicts first, then disk space.
//! All checks touch the filesystem and may run ffprobe, so [`AdmissionController::admit`]
//! is blocking and the queue manager runs it on the blocking pool.

use crate::config::EncodingSettings;
use crate::conflict::{self, ConflictReport};
use crate::disk_space::{DiskSpaceEstimator, DiskSpaceReport, EstimateInput};
use crate::filesystem::Filesystem;
use crate::item::QueueItem;
use crate::probe::DurationProbe;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of admitting a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AdmissionResult {
    Clear,
    ConflictsFound { conflicts: Vec<ConflictReport> },
    InsufficientSpace { report: DiskSpaceReport },
}

impl AdmissionResult {
    pub fn is_clear(&self) -> bool {
        matches!(self, AdmissionResult::Clear)
    }
}

/// Decisions the caller already made about earlier admission results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionOverrides {
    /// Conflicts were accepted with the overwrite strategy.
    pub accept_overwrite: bool,
    /// Proceed even when a volume is short on space.
    pub force_space: bool,
}

#[derive(Clone)]
pub struct AdmissionController {
    fs: Arc<dyn Filesystem>,
    probe: Arc<dyn DurationProbe>,
    estimator: DiskSpaceEstimator,
}

impl AdmissionController {
    pub fn new(
        fs: Arc<dyn Filesystem>,
        probe: Arc<dyn DurationProbe>,
        estimator: DiskSpaceEstimator,
    ) -> Self {
        Self { fs, probe, estimator }
    }

    /// Check a batch of pending items.
    ///
    /// Returns the first blocking finding. Space is only checked once the
    /// batch is conflict free (or conflicts were accepted).
    pub fn admit(
        &self,
        items: &[QueueItem],
        settings: &EncodingSettings,
        overrides: AdmissionOverrides,
    ) -> AdmissionResult {
        self.admit_alongside(items, &[], settings, overrides)
    }

    /// Like [`AdmissionController::admit`], with `in_flight` items that were
    /// already dispatched counted toward the space requirement. Their outputs
    /// are not checked for conflicts.
    pub fn admit_alongside(
        &self,
        items: &[QueueItem],
        in_flight: &[QueueItem],
        settings: &EncodingSettings,
        overrides: AdmissionOverrides,
    ) -> AdmissionResult {
        if !overrides.accept_overwrite {
            let conflicts = conflict::detect(items, self.fs.as_ref());
            if !conflicts.is_empty() {
                tracing::info!(count = conflicts.len(), "admission found output conflicts");
                return AdmissionResult::ConflictsFound { conflicts };
            }
        }

        let inputs: Vec<EstimateInput> = items
            .iter()
            .chain(in_flight)
            .map(|item| self.estimate_input(item))
            .collect();
        let reports = self.estimator.estimate_batch(&inputs, settings);

        if let Some(short) = reports.into_iter().find(|r| !r.sufficient) {
            if overrides.force_space {
                tracing::warn!(
                    volume = %short.volume_label,
                    required = short.required,
                    available = short.available,
                    "insufficient disk space, proceeding because space check was forced"
                );
            } else {
                tracing::info!(
                    volume = %short.volume_label,
                    required = short.required,
                    available = short.available,
                    "admission blocked on disk space"
                );
                return AdmissionResult::InsufficientSpace { report: short };
            }
        }

        AdmissionResult::Clear
    }

    fn estimate_input(&self, item: &QueueItem) -> EstimateInput {
        let source_bytes = self.fs.file_size(&item.video_path);
        // A missing source needs no probe: it requires nothing
        let duration_secs = match source_bytes {
            Some(_) => match self.probe.duration_secs(&item.video_path) {
                Ok(secs) => Some(secs),
                Err(e) => {
                    tracing::debug!(
                        video = %item.video_path.display(),
                        error = %e,
                        "duration probe failed, skipping estimate"
                    );
                    None
                }
            },
            None => None,
        };

        EstimateInput {
            output_path: item.output_path.clone(),
            duration_secs,
            source_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdmissionConfig, QualityMode};
    use crate::filesystem::VolumeSpace;
    use crate::item::NewItem;
    use crate::probe::{FixedDurationProbe, ProbeError};
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};

    struct FakeFs {
        existing: HashSet<PathBuf>,
        available: u64,
    }

    impl Filesystem for FakeFs {
        fn exists(&self, path: &Path) -> bool {
            self.existing.contains(path)
        }

        fn file_size(&self, path: &Path) -> Option<u64> {
            self.existing.contains(path).then_some(1_000_000)
        }

        fn volume_space(&self, _path: &Path) -> Option<VolumeSpace> {
            Some(VolumeSpace {
                label: "/".to_string(),
                available: self.available,
                total: self.available * 2,
            })
        }
    }

    struct FailingProbe;

    impl DurationProbe for FailingProbe {
        fn duration_secs(&self, _path: &Path) -> Result<f64, ProbeError> {
            Err(ProbeError::FfprobeFailed("no streams".to_string()))
        }
    }

    fn controller(existing: &[&str], available: u64, probe: Arc<dyn DurationProbe>) -> AdmissionController {
        let fs: Arc<dyn Filesystem> = Arc::new(FakeFs {
            existing: existing.iter().map(PathBuf::from).collect(),
            available,
        });
        let estimator = DiskSpaceEstimator::new(fs.clone(), &AdmissionConfig::default());
        AdmissionController::new(fs, probe, estimator)
    }

    fn item(video: &str, output: &str) -> QueueItem {
        QueueItem::new(NewItem::new(video, "/in/sub.srt", output))
    }

    fn bitrate_2000() -> EncodingSettings {
        EncodingSettings {
            quality_mode: QualityMode::Bitrate,
            bitrate_kbps: 2000,
            ..EncodingSettings::default()
        }
    }

    #[test]
    fn test_clear_when_no_conflicts_and_space_fits() {
        let ctl = controller(&["/in/a.mkv"], 1_000_000_000, Arc::new(FixedDurationProbe(600.0)));
        let result = ctl.admit(
            &[item("/in/a.mkv", "/out/a.mp4")],
            &bitrate_2000(),
            AdmissionOverrides::default(),
        );
        assert_eq!(result, AdmissionResult::Clear);
    }

    #[test]
    fn test_conflicts_checked_before_space() {
        // Both problems present; conflicts win
        let ctl = controller(&["/in/a.mkv", "/out/a.mp4"], 0, Arc::new(FixedDurationProbe(600.0)));
        let items = vec![item("/in/a.mkv", "/out/a.mp4")];
        match ctl.admit(&items, &bitrate_2000(), AdmissionOverrides::default()) {
            AdmissionResult::ConflictsFound { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].item_id, items[0].id);
            }
            other => panic!("expected conflicts, got {:?}", other),
        }
    }

    #[test]
    fn test_accepted_overwrite_moves_on_to_space() {
        let ctl = controller(&["/in/a.mkv", "/out/a.mp4"], 100_000_000, Arc::new(FixedDurationProbe(600.0)));
        let overrides = AdmissionOverrides {
            accept_overwrite: true,
            force_space: false,
        };
        match ctl.admit(&[item("/in/a.mkv", "/out/a.mp4")], &bitrate_2000(), overrides) {
            AdmissionResult::InsufficientSpace { report } => {
                assert_eq!(report.required, 150_000_000);
                assert_eq!(report.available, 100_000_000);
                assert!(!report.sufficient);
            }
            other => panic!("expected insufficient space, got {:?}", other),
        }
    }

    #[test]
    fn test_force_space_proceeds() {
        let ctl = controller(&["/in/a.mkv"], 100_000_000, Arc::new(FixedDurationProbe(600.0)));
        let overrides = AdmissionOverrides {
            accept_overwrite: false,
            force_space: true,
        };
        assert!(ctl
            .admit(&[item("/in/a.mkv", "/out/a.mp4")], &bitrate_2000(), overrides)
            .is_clear());
    }

    #[test]
    fn test_probe_failure_does_not_block() {
        let ctl = controller(&["/in/a.mkv"], 0, Arc::new(FailingProbe));
        assert!(ctl
            .admit(&[item("/in/a.mkv", "/out/a.mp4")], &bitrate_2000(), AdmissionOverrides::default())
            .is_clear());
    }

    #[test]
    fn test_batch_requirements_are_summed() {
        // One 150 MB job fits in 200 MB, two do not
        let ctl = controller(&["/in/a.mkv", "/in/b.mkv"], 200_000_000, Arc::new(FixedDurationProbe(600.0)));
        let one = vec![item("/in/a.mkv", "/out/a.mp4")];
        assert!(ctl.admit(&one, &bitrate_2000(), AdmissionOverrides::default()).is_clear());

        let two = vec![item("/in/a.mkv", "/out/a.mp4"), item("/in/b.mkv", "/out/b.mp4")];
        assert!(matches!(
            ctl.admit(&two, &bitrate_2000(), AdmissionOverrides::default()),
            AdmissionResult::InsufficientSpace { .. }
        ));
    }

    #[test]
    fn test_in_flight_counts_for_space_but_not_conflicts() {
        // The active job's output is already on disk
        let ctl = controller(
            &["/in/a.mkv", "/in/b.mkv", "/out/a.mp4"],
            200_000_000,
            Arc::new(FixedDurationProbe(600.0)),
        );
        let active = vec![item("/in/a.mkv", "/out/a.mp4")];
        let added = vec![item("/in/b.mkv", "/out/b.mp4")];

        assert!(ctl.admit(&added, &bitrate_2000(), AdmissionOverrides::default()).is_clear());
        match ctl.admit_alongside(&added, &active, &bitrate_2000(), AdmissionOverrides::default()) {
            AdmissionResult::InsufficientSpace { report } => {
                assert_eq!(report.required, 300_000_000);
                assert_eq!(report.available, 200_000_000);
            }
            other => panic!("expected insufficient space, got {:?}", other),
        }
    }
}
