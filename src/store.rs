use crate::snapshot::{ComputerVisionSnapshot, Snapshot};
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Last-write-wins holder for the two published snapshots.
///
/// Each slot has its own lock, held only for the `Arc` swap or clone.
/// Readers get an immutable handle to whatever was published last.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    latest: Mutex<Option<Arc<Snapshot>>>,
    latest_cv: Mutex<Option<Arc<ComputerVisionSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        let previous = self.latest.lock().replace(snapshot);
        // Old value is released outside the lock.
        drop(previous);
    }

    pub fn publish_cv(&self, snapshot: ComputerVisionSnapshot) {
        let snapshot = Arc::new(snapshot);
        let previous = self.latest_cv.lock().replace(snapshot);
        drop(previous);
    }

    /// Latest snapshot, or `None` before the first publish.
    pub fn read_latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.lock().clone()
    }

    /// Latest computer-vision snapshot, or `None` before the first publish.
    pub fn read_latest_cv(&self) -> Option<Arc<ComputerVisionSnapshot>> {
        self.latest_cv.lock().clone()
    }

    /// Latest snapshot encoded as JSON; serialization runs outside the lock.
    pub fn read_latest_json(&self) -> Result<Option<String>> {
        self.read_latest().map(|s| s.to_json()).transpose()
    }

    pub fn read_latest_cv_json(&self) -> Result<Option<String>> {
        self.read_latest_cv().map(|s| s.to_json()).transpose()
    }
}
