//! Disk Space Estimator
//!
//! Predicts how many bytes an encode will write and compares that against the
//! free space of the destination volume. The estimate is advisory: anything
//! that cannot be measured (missing source, failed probe, unknown volume)
//! counts as "no requirement" and the encoder surfaces the real error later.

use crate::config::{AdmissionConfig, EncodingSettings, QualityMode};
use crate::filesystem::Filesystem;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Label used when the destination volume cannot be identified.
pub const UNKNOWN_VOLUME: &str = "unknown";

/// Result of a space check for one volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpaceReport {
    pub available: u64,
    pub total: u64,
    pub required: u64,
    pub sufficient: bool,
    /// Mount point (or drive) the outputs land on.
    pub volume_label: String,
}

/// What the estimator needs to know about one prospective output.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateInput {
    pub output_path: PathBuf,
    /// Source duration; `None` when the probe failed.
    pub duration_secs: Option<f64>,
    /// Source file size; `None` when the source is missing.
    pub source_bytes: Option<u64>,
}

/// Bytes an encode is expected to write.
///
/// Bitrate mode is `duration * kbps * 1000 / 8`. Constant-quality output size
/// cannot be derived from the quality value, so it is the source bitrate over
/// the same duration (i.e. the source size) scaled by `cq_size_multiplier`.
pub fn required_bytes(
    input: &EstimateInput,
    settings: &EncodingSettings,
    cq_size_multiplier: f64,
) -> u64 {
    let Some(source_bytes) = input.source_bytes else {
        return 0;
    };

    match settings.quality_mode {
        QualityMode::Bitrate => match input.duration_secs {
            Some(secs) if secs > 0.0 => {
                (secs * settings.bitrate_kbps as f64 * 1000.0 / 8.0).round() as u64
            }
            _ => 0,
        },
        QualityMode::ConstantQuality => {
            (source_bytes as f64 * cq_size_multiplier).round() as u64
        }
    }
}

/// Whether `available` covers `required` with the safety margin applied.
pub fn is_sufficient(available: u64, required: u64, safety_margin: f64) -> bool {
    available as f64 >= required as f64 * safety_margin
}

/// Estimates required space per destination volume.
#[derive(Clone)]
pub struct DiskSpaceEstimator {
    fs: Arc<dyn Filesystem>,
    safety_margin: f64,
    cq_size_multiplier: f64,
}

impl DiskSpaceEstimator {
    pub fn new(fs: Arc<dyn Filesystem>, config: &AdmissionConfig) -> Self {
        Self {
            fs,
            safety_margin: config.safety_margin,
            cq_size_multiplier: config.cq_size_multiplier,
        }
    }

    /// Estimate a single output.
    pub fn estimate(&self, input: &EstimateInput, settings: &EncodingSettings) -> DiskSpaceReport {
        let required = required_bytes(input, settings, self.cq_size_multiplier);
        self.report_for(&input.output_path, required)
    }

    /// Estimate a batch, summing requirements of outputs that share a volume.
    ///
    /// Returns one report per volume in order of first appearance.
    pub fn estimate_batch(
        &self,
        inputs: &[EstimateInput],
        settings: &EncodingSettings,
    ) -> Vec<DiskSpaceReport> {
        let mut reports: Vec<DiskSpaceReport> = Vec::new();

        for input in inputs {
            let required = required_bytes(input, settings, self.cq_size_multiplier);
            let single = self.report_for(&input.output_path, required);

            match reports
                .iter_mut()
                .find(|r| r.volume_label == single.volume_label)
            {
                Some(existing) => {
                    existing.required = existing.required.saturating_add(required);
                    existing.sufficient = existing.volume_label == UNKNOWN_VOLUME
                        || is_sufficient(existing.available, existing.required, self.safety_margin);
                }
                None => reports.push(single),
            }
        }

        reports
    }

    fn report_for(&self, output_path: &std::path::Path, required: u64) -> DiskSpaceReport {
        match self.fs.volume_space(output_path) {
            Some(volume) => DiskSpaceReport {
                available: volume.available,
                total: volume.total,
                required,
                sufficient: is_sufficient(volume.available, required, self.safety_margin),
                volume_label: volume.label,
            },
            None => {
                tracing::debug!(
                    output = %output_path.display(),
                    "destination volume unknown, skipping space check"
                );
                DiskSpaceReport {
                    available: 0,
                    total: 0,
                    required,
                    sufficient: true,
                    volume_label: UNKNOWN_VOLUME.to_string(),
                }
            }
        }
    }
}
