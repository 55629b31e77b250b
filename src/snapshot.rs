//! ==============================================================================
//! snapshot.rs - the device's last known reading
//! ==============================================================================
//!
//! holds exactly one snapshot (or none before the first reading). a snapshot
//! is always replaced wholesale so channels from different capture instants
//! never mix.
//!
//! two ways in:
//!     - ingest:      the device reported. always wins, whatever its timestamp.
//!     - reconcile:   a row came back from the store. only fills an empty
//!                    store, or replaces an older snapshot with a newer one.
//!
//! locking lives in coordinator.rs; this type is plain data.
//!
//! ==============================================================================

use crate::domain::{Reading, Snapshot};
use chrono::{DateTime, Utc};

#[derive(Clone, Debug, Default)]
pub struct SnapshotStore {
    current: Option<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot with an already validated reading.
    pub fn ingest(&mut self, reading: Reading, captured_at: DateTime<Utc>) -> &Snapshot {
        self.current.insert(Snapshot { reading, captured_at })
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Cold-start fill. Returns whether the snapshot was taken.
    pub fn replace_if_empty(&mut self, snapshot: Snapshot) -> bool {
        if self.current.is_some() {
            return false;
        }
        self.current = Some(snapshot);
        true
    }

    /// Warm reconciliation: adopt `snapshot` only if it is strictly newer.
    pub fn replace_if_newer(&mut self, snapshot: Snapshot) -> bool {
        match &self.current {
            Some(current) if current.captured_at >= snapshot.captured_at => false,
            _ => {
                self.current = Some(snapshot);
                true
            }
        }
    }
}
