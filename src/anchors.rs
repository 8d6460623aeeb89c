use parking_lot::Mutex;
use std::collections::HashSet;

/// Insertion-ordered set of anchor identifiers.
#[derive(Debug, Default)]
struct OrderedIds {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl OrderedIds {
    fn insert(&mut self, id: &str) {
        if self.seen.insert(id.to_owned()) {
            self.order.push(id.to_owned());
        }
    }

    fn take(&mut self) -> Vec<String> {
        self.seen.clear();
        std::mem::take(&mut self.order)
    }
}

#[derive(Debug, Default)]
struct Pending {
    added: OrderedIds,
    removed: OrderedIds,
}

/// Anchors added and removed since the last drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl AnchorDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Accumulates anchor add/remove events between consumer reads.
///
/// Record calls come from the session's anchor-update path, drains from the
/// aggregation pass; both sides go through one short lock. Each event is
/// reported by exactly one drain. An anchor added and removed within the same
/// interval is reported in both lists.
#[derive(Debug, Default)]
pub struct AnchorDeltaTracker {
    pending: Mutex<Pending>,
}

impl AnchorDeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_added(&self, id: &str) {
        log::trace!("anchor added: {}", id);
        self.pending.lock().added.insert(id);
    }

    pub fn record_removed(&self, id: &str) {
        log::trace!("anchor removed: {}", id);
        self.pending.lock().removed.insert(id);
    }

    pub fn drain_added(&self) -> Vec<String> {
        self.pending.lock().added.take()
    }

    pub fn drain_removed(&self) -> Vec<String> {
        self.pending.lock().removed.take()
    }

    /// Drain both lists under a single lock.
    pub fn drain(&self) -> AnchorDelta {
        let mut pending = self.pending.lock();
        AnchorDelta {
            added: pending.added.take(),
            removed: pending.removed.take(),
        }
    }
}
