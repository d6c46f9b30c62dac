//! Per-collection version tracking (spec.md §4.3).
//!
//! `data_version` advances once per mutation (a batch insert of N records is
//! one bump, not N); `index_version` only ever moves forward to a
//! `data_version` value observed at some prior snapshot. Staleness is
//! `index_version < data_version`. Mutation is only ever valid under the
//! collection's write lock — this type has no interior locking of its own.

use crate::collection::IndexType;

#[derive(Debug, Clone, Default)]
pub struct VersionTracker {
    data_version: u64,
    index_version: u64,
    installed_index_type: Option<IndexType>,
    last_rebuild_error: Option<String>,
}

impl VersionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_version(&self) -> u64 {
        self.data_version
    }

    pub fn index_version(&self) -> u64 {
        self.index_version
    }

    pub fn installed_index_type(&self) -> Option<IndexType> {
        self.installed_index_type
    }

    pub fn last_rebuild_error(&self) -> Option<&str> {
        self.last_rebuild_error.as_deref()
    }

    pub fn is_stale(&self) -> bool {
        self.index_version < self.data_version
    }

    /// Called once per mutation operation, regardless of the size of the
    /// batch it represents.
    pub fn bump_data_version(&mut self) -> u64 {
        self.data_version += 1;
        self.data_version
    }

    /// Stamps the version a rebuild observed at snapshot time. Never moves
    /// `index_version` backwards — a superseded rebuild still installs, per
    /// spec, but callers are expected to re-enqueue another rebuild in that
    /// case rather than relying on this method to detect it.
    pub fn install_index(&mut self, index_type: IndexType, snapshot_version: u64) {
        self.index_version = snapshot_version;
        self.installed_index_type = Some(index_type);
    }

    pub fn clear_index(&mut self) {
        self.index_version = 0;
        self.installed_index_type = None;
    }

    pub fn record_rebuild_error(&mut self, message: String) {
        self.last_rebuild_error = Some(message);
    }

    pub fn clear_rebuild_error(&mut self) {
        self.last_rebuild_error = None;
    }
}
