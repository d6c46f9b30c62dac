//! Process-wide collection registry (spec.md §4.4).
//!
//! One `(rw_lock, index_slot, version_tracker)` triple per collection,
//! wrapped in a single owned [`CollectionEntry`]. The [`Registry`]'s own
//! mutex guards only lookup/insert/remove of the `Arc<CollectionEntry>`
//! itself — never held while a collection's read or write lock is held, so
//! collection operations never contend with each other through it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::collection::Collection;
use crate::filter::MetadataBitmapIndex;
use crate::group::Group;
use crate::ids::{CollectionId, GroupId, RecordId};
use crate::index::{LshConfig, VectorIndex};
use crate::record::Record;
use crate::version::VersionTracker;

/// Everything living behind a collection's reader-writer lock.
pub struct CollectionState {
    pub collection: Collection,
    pub groups: HashMap<GroupId, Group>,
    pub records: HashMap<RecordId, Record>,
    pub versions: VersionTracker,
    pub installed_index: Option<Box<dyn VectorIndex>>,
    pub bitmap: MetadataBitmapIndex,
    /// The LSH construction parameters last requested by an explicit
    /// `build` call, reused by automatic rebuilds so a stale-triggered
    /// rebuild doesn't silently fall back to defaults.
    pub lsh_config: Option<LshConfig>,
}

impl CollectionState {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            groups: HashMap::new(),
            records: HashMap::new(),
            versions: VersionTracker::new(),
            installed_index: None,
            bitmap: MetadataBitmapIndex::new(),
            lsh_config: None,
        }
    }
}

/// The registry's per-collection slot: lock, index, versions, and the
/// rebuild-in-progress flag that makes background rebuild scheduling
/// idempotent.
pub struct CollectionEntry {
    pub state: RwLock<CollectionState>,
    rebuild_in_progress: AtomicBool,
}

impl CollectionEntry {
    pub fn new(collection: Collection) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(CollectionState::new(collection)),
            rebuild_in_progress: AtomicBool::new(false),
        })
    }

    /// Claims the rebuild-in-progress flag. `false` means a rebuild for this
    /// collection is already in flight — the caller should coalesce instead
    /// of scheduling a second one.
    pub fn try_begin_rebuild(&self) -> bool {
        self.rebuild_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn rebuild_in_progress(&self) -> bool {
        self.rebuild_in_progress.load(Ordering::SeqCst)
    }

    pub fn finish_rebuild(&self) {
        self.rebuild_in_progress.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct Registry {
    collections: Mutex<HashMap<CollectionId, Arc<CollectionEntry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: CollectionId, entry: Arc<CollectionEntry>) {
        self.collections.lock().insert(id, entry);
    }

    pub fn get(&self, id: CollectionId) -> Option<Arc<CollectionEntry>> {
        self.collections.lock().get(&id).cloned()
    }

    pub fn remove(&self, id: CollectionId) -> Option<Arc<CollectionEntry>> {
        self.collections.lock().remove(&id)
    }

    pub fn list(&self) -> Vec<Arc<CollectionEntry>> {
        self.collections.lock().values().cloned().collect()
    }
}
