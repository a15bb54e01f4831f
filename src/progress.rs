//! Progress reporting for bulk transfers.
//!
//! The engine only knows this interface. Rendering lives with the caller,
//! and the no-op reporter is used when nothing is attached.

use std::sync::Arc;

/// Handle of one running progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressId(pub u64);

/// Receives progress events from bulk reads and writes.
pub trait Progress: Send + Sync {
    /// Start a bar of `total` steps.
    fn start(&self, label: &str, total: u64) -> ProgressId;

    /// `delta` more steps are done.
    fn increment(&self, id: ProgressId, delta: u64);

    fn finish(&self, id: ProgressId);
}

/// Reports nothing.
#[derive(Debug, Default)]
pub struct NoOpProgress;

impl Progress for NoOpProgress {
    fn start(&self, _label: &str, _total: u64) -> ProgressId {
        ProgressId(0)
    }

    fn increment(&self, _id: ProgressId, _delta: u64) {}

    fn finish(&self, _id: ProgressId) {}
}

pub type ProgressArc = Arc<dyn Progress>;

pub fn no_op_progress() -> ProgressArc {
    Arc::new(NoOpProgress)
}

/// A started bar. Finishes itself when dropped, so an early `?` return
/// does not leave a bar hanging.
pub struct ProgressHandle {
    progress: ProgressArc,
    id: ProgressId,
    finished: bool,
}

impl ProgressHandle {
    pub fn begin(progress: &ProgressArc, label: &str, total: u64) -> Self {
        let id = progress.start(label, total);
        ProgressHandle {
            progress: Arc::clone(progress),
            id,
            finished: false,
        }
    }

    pub fn step(&self) {
        self.progress.increment(self.id, 1);
    }

    pub fn finish(mut self) {
        self.finished = true;
        self.progress.finish(self.id);
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        if !self.finished {
            self.progress.finish(self.id);
        }
    }
}
