//! Ordered item list and its structural operations
//!
//! Pure data: no I/O, no async. The queue manager actor owns one of these.

use crate::item::{ItemStatus, QueueItem, QueueStats};
use crate::manager::QueueError;
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct QueueState {
    items: Vec<QueueItem>,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    pub fn push_all(&mut self, items: Vec<QueueItem>) {
        self.items.extend(items);
    }

    /// Remove a non-processing item.
    pub fn remove(&mut self, id: &str) -> Result<QueueItem, QueueError> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if self.items[index].status == ItemStatus::Processing {
            return Err(QueueError::InvariantViolation(format!(
                "item {} is processing and cannot be removed",
                id
            )));
        }
        Ok(self.items.remove(index))
    }

    /// Move the pending item at `from` to the slot of the pending item at `to`.
    ///
    /// Only the pending sublist is permuted. Every other item keeps its index.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), QueueError> {
        let len = self.items.len();
        if from >= len || to >= len {
            return Err(QueueError::InvalidIndex { from, to, len });
        }
        for index in [from, to] {
            let item = &self.items[index];
            if item.status != ItemStatus::Pending {
                return Err(QueueError::InvariantViolation(format!(
                    "item at index {} is {} and cannot be reordered",
                    index, item.status
                )));
            }
        }
        if from == to {
            return Ok(());
        }

        let slots: Vec<usize> = (0..len)
            .filter(|&i| self.items[i].status == ItemStatus::Pending)
            .collect();
        let position = |index: usize| slots.iter().position(|&slot| slot == index);
        let (Some(sub_from), Some(sub_to)) = (position(from), position(to)) else {
            return Err(QueueError::Internal("pending slot lookup failed".to_string()));
        };

        let mut pending: Vec<QueueItem> =
            slots.iter().map(|&slot| self.items[slot].clone()).collect();
        let moved = pending.remove(sub_from);
        pending.insert(sub_to, moved);
        for (slot, item) in slots.into_iter().zip(pending) {
            self.items[slot] = item;
        }
        Ok(())
    }

    /// Drop every item except the processing one. Returns how many went.
    pub fn clear(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.status == ItemStatus::Processing);
        before - self.items.len()
    }

    pub fn processing(&self) -> Option<&QueueItem> {
        self.items
            .iter()
            .find(|item| item.status == ItemStatus::Processing)
    }

    pub fn next_pending(&self) -> Option<&QueueItem> {
        self.items
            .iter()
            .find(|item| item.status == ItemStatus::Pending)
    }

    pub fn pending(&self) -> Vec<QueueItem> {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Pending)
            .cloned()
            .collect()
    }

    /// Output paths owned by other items that are queued, running, or done
    pub fn claimed_outputs(&self, except_id: &str) -> HashSet<PathBuf> {
        self.items
            .iter()
            .filter(|item| {
                item.id != except_id
                    && !matches!(item.status, ItemStatus::Error | ItemStatus::Cancelled)
            })
            .map(|item| item.output_path.clone())
            .collect()
    }

    /// Output paths of other items that are encoding or already encoded
    pub fn committed_outputs(&self, except_id: &str) -> HashSet<PathBuf> {
        self.items
            .iter()
            .filter(|item| {
                item.id != except_id
                    && matches!(item.status, ItemStatus::Processing | ItemStatus::Completed)
            })
            .map(|item| item.output_path.clone())
            .collect()
    }

    /// Cancel every pending item. Returns the ids touched.
    pub fn cancel_pending(&mut self) -> Vec<String> {
        self.items
            .iter_mut()
            .filter(|item| item.status == ItemStatus::Pending || item.status == ItemStatus::Paused)
            .map(|item| {
                item.cancel();
                item.id.clone()
            })
            .collect()
    }

    pub fn stats(&self, queue_paused: bool, now_ms: i64) -> QueueStats {
        let mut stats = QueueStats {
            total: self.items.len(),
            queue_paused,
            ..QueueStats::default()
        };

        let mut completed_secs = 0.0;
        for item in &self.items {
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::Processing => stats.processing += 1,
                ItemStatus::Paused => stats.paused += 1,
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::Error => stats.error += 1,
                ItemStatus::Cancelled => stats.cancelled += 1,
            }
            if let Some(secs) = item.run_secs(now_ms) {
                stats.elapsed_secs += secs;
                if item.status == ItemStatus::Completed {
                    completed_secs += secs;
                }
            }
        }

        if stats.completed > 0 {
            let average = completed_secs / stats.completed as f64;
            let active_left = self
                .processing()
                .and_then(|item| item.run_secs(now_ms))
                .map(|running| (average - running).max(0.0))
                .unwrap_or(0.0);
            stats.estimated_remaining_secs =
                Some(average * (stats.pending + stats.paused) as f64 + active_left);
        }

        stats
    }
}
