//! `VectorDb` — the facade exposed to external collaborators (spec.md §6).
//!
//! Every method here acquires exactly the lock(s) its operation needs and
//! releases them before returning; nothing escapes a collection's lock.

use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use crate::cancel::ExecutionGuard;
use crate::collection::{Collection, CollectionPatch, IndexType};
use crate::error::{Error, Result};
use crate::filter::MetadataFilter;
use crate::group::{Group, GroupPatch};
use crate::ids::{CollectionId, GroupId, RecordId};
use crate::index::LshConfig;
use crate::metadata::Metadata;
use crate::planner::{self, QueryParams, QueryResult};
use crate::rebuild;
use crate::record::{Record, RecordPatch};
use crate::registry::{CollectionEntry, Registry};
use crate::vecmath::normalize;

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStatus {
    pub index_type: Option<IndexType>,
    pub size: usize,
    pub data_version: u64,
    pub index_version: u64,
    pub stale: bool,
    pub rebuild_in_progress: bool,
    pub last_rebuild_error: Option<String>,
}

/// A synchronous-enqueue handle for a build request. The rebuild itself
/// runs asynchronously; this id is a nominal handle for the caller's logs,
/// not a token that can be polled for completion (use `status` for that).
pub type BuildId = Uuid;

#[derive(Default)]
pub struct VectorDb {
    registry: Registry,
}

impl VectorDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, collection_id: CollectionId) -> Result<std::sync::Arc<CollectionEntry>> {
        self.registry
            .get(collection_id)
            .ok_or_else(|| Error::NotFound(format!("collection {collection_id}")))
    }

    // ---- collection operations -------------------------------------------------

    pub fn create_collection(
        &self,
        name: String,
        dimension: usize,
        default_index_type: IndexType,
        metadata: Metadata,
    ) -> Result<CollectionId> {
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument("collection name must not be empty".into()));
        }
        if dimension == 0 {
            return Err(Error::InvalidArgument("dimension must be positive".into()));
        }
        if self.registry.list().iter().any(|e| e.state.read().collection.name == name) {
            return Err(Error::AlreadyExists(format!("collection named {name}")));
        }

        let collection = Collection::new(name, dimension, default_index_type, metadata);
        let id = collection.id;
        tracing::info!(collection_id = %id, dimension, "collection created");
        self.registry.insert(id, CollectionEntry::new(collection));
        Ok(id)
    }

    pub fn get_collection(&self, id: CollectionId) -> Result<Collection> {
        Ok(self.entry(id)?.state.read().collection.clone())
    }

    pub fn list_collections(&self) -> Vec<Collection> {
        self.registry.list().iter().map(|e| e.state.read().collection.clone()).collect()
    }

    pub fn update_collection(&self, id: CollectionId, patch: CollectionPatch) -> Result<()> {
        if patch.is_empty() {
            return Err(Error::InvalidArgument("patch has no changes".into()));
        }
        let entry = self.entry(id)?;
        let mut state = entry.state.write();
        if let Some(name) = patch.name {
            state.collection.name = name;
        }
        if let Some(index_type) = patch.default_index_type {
            state.collection.default_index_type = index_type;
        }
        Ok(())
    }

    pub fn delete_collection(&self, id: CollectionId) -> Result<()> {
        self.entry(id)?;
        self.registry.remove(id);
        tracing::info!(collection_id = %id, "collection dropped");
        Ok(())
    }

    // ---- group operations -------------------------------------------------

    pub fn create_group(&self, collection_id: CollectionId, title: String, metadata: Metadata) -> Result<GroupId> {
        if title.trim().is_empty() {
            return Err(Error::InvalidArgument("group title must not be empty".into()));
        }
        let entry = self.entry(collection_id)?;
        let mut state = entry.state.write();
        let group = Group::new(collection_id, title, metadata);
        let id = group.id;
        state.groups.insert(id, group);
        Ok(id)
    }

    pub fn get_group(&self, collection_id: CollectionId, group_id: GroupId) -> Result<Group> {
        let entry = self.entry(collection_id)?;
        let state = entry.state.read();
        state
            .groups
            .get(&group_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("group {group_id}")))
    }

    pub fn list_groups(&self, collection_id: CollectionId) -> Result<Vec<Group>> {
        let entry = self.entry(collection_id)?;
        let groups = entry.state.read().groups.values().cloned().collect();
        Ok(groups)
    }

    pub fn update_group(&self, collection_id: CollectionId, group_id: GroupId, patch: GroupPatch) -> Result<()> {
        if patch.is_empty() {
            return Err(Error::InvalidArgument("patch has no changes".into()));
        }
        let entry = self.entry(collection_id)?;
        let mut state = entry.state.write();
        let group = state
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| Error::NotFound(format!("group {group_id}")))?;
        if let Some(title) = patch.title {
            group.title = title;
        }
        if let Some(author) = patch.author {
            group.metadata.author = author;
        }
        if let Some(tags) = patch.tags {
            group.metadata.tags = tags;
        }
        if let Some(source) = patch.source {
            group.metadata.source = source;
        }
        group.metadata.touch();
        Ok(())
    }

    /// Deleting a group cascades to its records, which bumps `data_version`
    /// exactly once even if many records were removed.
    pub fn delete_group(&self, collection_id: CollectionId, group_id: GroupId) -> Result<()> {
        let entry = self.entry(collection_id)?;
        let mut state = entry.state.write();
        if !state.groups.contains_key(&group_id) {
            return Err(Error::NotFound(format!("group {group_id}")));
        }
        state.groups.remove(&group_id);

        let doomed: Vec<RecordId> = state
            .records
            .values()
            .filter(|r| r.group_id == group_id)
            .map(|r| r.id)
            .collect();
        if !doomed.is_empty() {
            for id in &doomed {
                if let Some(record) = state.records.remove(id) {
                    state.bitmap.remove(&record);
                    if let Some(index) = state.installed_index.as_mut() {
                        index.remove(*id);
                    }
                }
            }
            state.versions.bump_data_version();
        }
        Ok(())
    }

    // ---- record operations -------------------------------------------------

    pub fn insert_record(
        &self,
        collection_id: CollectionId,
        group_id: GroupId,
        text: String,
        embedding: Vec<f32>,
        metadata: Metadata,
    ) -> Result<RecordId> {
        let entry = self.entry(collection_id)?;
        let mut state = entry.state.write();
        if !state.groups.contains_key(&group_id) {
            return Err(Error::NotFound(format!("group {group_id}")));
        }
        if embedding.len() != state.collection.dimension {
            return Err(Error::DimensionMismatch {
                expected: state.collection.dimension,
                got: embedding.len(),
            });
        }
        let normalized = normalize(&embedding)?;

        let record = Record::new(collection_id, group_id, text, normalized, metadata);
        let id = record.id;
        state.bitmap.insert(&record);
        if let Some(index) = state.installed_index.as_mut() {
            index.insert(id, record.embedding.clone())?;
        }
        state.records.insert(id, record);
        state.versions.bump_data_version();
        Ok(id)
    }

    pub fn get_record(&self, collection_id: CollectionId, record_id: RecordId) -> Result<Record> {
        let entry = self.entry(collection_id)?;
        let state = entry.state.read();
        state
            .records
            .get(&record_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("record {record_id}")))
    }

    pub fn list_records(&self, collection_id: CollectionId, filter: Option<MetadataFilter>) -> Result<Vec<Record>> {
        let entry = self.entry(collection_id)?;
        let state = entry.state.read();
        let filter = filter.unwrap_or_default();
        Ok(state
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    pub fn update_record(&self, collection_id: CollectionId, record_id: RecordId, patch: RecordPatch) -> Result<()> {
        if patch.is_empty() {
            return Err(Error::InvalidArgument("patch has no changes".into()));
        }
        let entry = self.entry(collection_id)?;
        let mut state = entry.state.write();
        let dimension = state.collection.dimension;

        let changes_embedding = patch.changes_embedding();
        let new_embedding = match &patch.embedding {
            Some(embedding) => {
                if embedding.len() != dimension {
                    return Err(Error::DimensionMismatch {
                        expected: dimension,
                        got: embedding.len(),
                    });
                }
                Some(normalize(embedding)?)
            }
            None => None,
        };

        let old_record = state
            .records
            .get(&record_id)
            .ok_or_else(|| Error::NotFound(format!("record {record_id}")))?
            .clone();
        state.bitmap.remove(&old_record);

        let record = state.records.get_mut(&record_id).expect("checked above");
        if let Some(text) = patch.text {
            record.text = text;
        }
        if let Some(embedding) = new_embedding {
            record.embedding = embedding;
        }
        if let Some(author) = patch.author {
            record.metadata.author = author;
        }
        if let Some(tags) = patch.tags {
            record.metadata.tags = tags;
        }
        if let Some(source) = patch.source {
            record.metadata.source = source;
        }
        record.metadata.touch();
        let record = state.records.get(&record_id).expect("checked above").clone();
        state.bitmap.insert(&record);

        if changes_embedding {
            if let Some(index) = state.installed_index.as_mut() {
                index.update(record_id, record.embedding.clone())?;
            }
        }
        state.versions.bump_data_version();
        Ok(())
    }

    pub fn delete_record(&self, collection_id: CollectionId, record_id: RecordId) -> Result<()> {
        let entry = self.entry(collection_id)?;
        let mut state = entry.state.write();
        let record = state
            .records
            .remove(&record_id)
            .ok_or_else(|| Error::NotFound(format!("record {record_id}")))?;
        state.bitmap.remove(&record);
        if let Some(index) = state.installed_index.as_mut() {
            index.remove(record_id);
        }
        state.versions.bump_data_version();
        Ok(())
    }

    // ---- index operations -------------------------------------------------

    /// `lsh_config` supplies the construction parameters (hyperplane count,
    /// table count, seed) when `index_type` is `IndexType::Lsh`; ignored
    /// otherwise. Passing `None` reuses the collection's last LSH config.
    /// `guard` lets the caller cancel or time-box this build; a tripped
    /// guard leaves the previously installed index (if any) unchanged.
    pub fn build(&self, collection_id: CollectionId, index_type: IndexType, lsh_config: Option<LshConfig>, guard: ExecutionGuard) -> Result<BuildId> {
        let entry = self.entry(collection_id)?;
        rebuild::schedule_rebuild(entry, index_type, lsh_config, guard);
        Ok(Uuid::new_v4())
    }

    pub fn status(&self, collection_id: CollectionId) -> Result<CollectionStatus> {
        let entry = self.entry(collection_id)?;
        let state = entry.state.read();
        Ok(CollectionStatus {
            index_type: state.versions.installed_index_type(),
            size: state.records.len(),
            data_version: state.versions.data_version(),
            index_version: state.versions.index_version(),
            stale: state.versions.is_stale(),
            rebuild_in_progress: entry.rebuild_in_progress(),
            last_rebuild_error: state.versions.last_rebuild_error().map(str::to_string),
        })
    }

    // ---- query --------------------------------------------------------------

    pub fn query(&self, collection_id: CollectionId, params: QueryParams) -> Result<QueryResult> {
        let entry = self.entry(collection_id)?;
        let (result, should_schedule) = {
            let state = entry.state.read();
            planner::plan_and_execute(&state, &params)?
        };
        if should_schedule {
            // Rebuild whatever is already installed, not the collection's
            // default — otherwise an explicit `build` to a non-default index
            // type gets silently clobbered the next time staleness triggers
            // an automatic rebuild.
            let index_type = {
                let state = entry.state.read();
                state.versions.installed_index_type().unwrap_or(state.collection.default_index_type)
            };
            rebuild::schedule_rebuild(entry, index_type, None, ExecutionGuard::none());
        }
        Ok(result)
    }

    // ---- snapshot export/import ---------------------------------------------

    /// Registers a collection under its existing id rather than minting a
    /// new one, so a replication follower can later `import_snapshot` into
    /// it. Fails if a collection with this id is already registered.
    pub fn register_replica_collection(&self, collection: Collection) -> Result<()> {
        if self.registry.get(collection.id).is_some() {
            return Err(Error::AlreadyExists(format!("collection {}", collection.id)));
        }
        let id = collection.id;
        self.registry.insert(id, CollectionEntry::new(collection));
        Ok(())
    }

    /// A read-only export of one collection's logical state, for the
    /// replication collaborator. Embeddings are already unit-normalized.
    pub fn export_snapshot(&self, collection_id: CollectionId) -> Result<CollectionSnapshot> {
        let entry = self.entry(collection_id)?;
        let state = entry.state.read();
        Ok(CollectionSnapshot {
            collection: state.collection.clone(),
            groups: state.groups.values().cloned().collect(),
            records: state.records.values().cloned().collect(),
        })
    }

    /// Replaces a collection's state wholesale under its write lock and
    /// forces a rebuild, since the imported records invalidate any installed
    /// index. The collection must already exist — import does not create
    /// collections.
    pub fn import_snapshot(&self, snapshot: CollectionSnapshot) -> Result<()> {
        let entry = self.entry(snapshot.collection.id)?;
        let index_type = {
            let mut state = entry.state.write();
            let seen_group_ids: HashSet<GroupId> = snapshot.groups.iter().map(|g| g.id).collect();
            if snapshot.records.iter().any(|r| !seen_group_ids.contains(&r.group_id)) {
                return Err(Error::InvalidArgument("snapshot record references unknown group".into()));
            }

            state.groups = snapshot.groups.into_iter().map(|g| (g.id, g)).collect();
            state.bitmap.clear();
            for record in &snapshot.records {
                state.bitmap.insert(record);
            }
            state.records = snapshot.records.into_iter().map(|r| (r.id, r)).collect();
            state.installed_index = None;
            state.versions.clear_index();
            state.versions.bump_data_version();
            state.collection.default_index_type
        };
        rebuild::schedule_rebuild(entry, index_type, None, ExecutionGuard::none());
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionSnapshot {
    pub collection: Collection,
    pub groups: Vec<Group>,
    pub records: Vec<Record>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::ExecutionGuard;

    fn new_db_with_collection(dimension: usize) -> (VectorDb, CollectionId, GroupId) {
        let db = VectorDb::new();
        let collection_id = db
            .create_collection("test".into(), dimension, IndexType::Flat, Metadata::new())
            .unwrap();
        let group_id = db.create_group(collection_id, "group".into(), Metadata::new()).unwrap();
        (db, collection_id, group_id)
    }

    fn query_params(query: Vec<f32>, k: usize) -> QueryParams {
        QueryParams {
            query,
            k,
            filter: MetadataFilter::default(),
            allow_stale: false,
            use_fallback_on_stale: true,
            guard: ExecutionGuard::none(),
        }
    }

    #[test]
    fn test_create_collection_rejects_duplicate_name() {
        let db = VectorDb::new();
        db.create_collection("dup".into(), 3, IndexType::Flat, Metadata::new()).unwrap();
        let err = db
            .create_collection("dup".into(), 3, IndexType::Flat, Metadata::new())
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_insert_record_normalizes_and_bumps_version() {
        let (db, collection_id, group_id) = new_db_with_collection(3);
        db.insert_record(collection_id, group_id, "hi".into(), vec![3.0, 0.0, 0.0], Metadata::new())
            .unwrap();
        let status = db.status(collection_id).unwrap();
        assert_eq!(status.data_version, 1);
        assert_eq!(status.size, 1);
    }

    #[test]
    fn test_insert_record_rejects_zero_vector() {
        let (db, collection_id, group_id) = new_db_with_collection(3);
        let err = db
            .insert_record(collection_id, group_id, "hi".into(), vec![0.0, 0.0, 0.0], Metadata::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(db.status(collection_id).unwrap().data_version, 0);
    }

    #[test]
    fn test_dimension_enforcement_leaves_state_unchanged() {
        let (db, collection_id, group_id) = new_db_with_collection(8);
        let err = db
            .insert_record(collection_id, group_id, "hi".into(), vec![1.0, 0.0, 0.0], Metadata::new())
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert_eq!(db.status(collection_id).unwrap().data_version, 0);
    }

    #[test]
    fn test_delete_group_cascades_and_bumps_once() {
        let (db, collection_id, group_id) = new_db_with_collection(2);
        db.insert_record(collection_id, group_id, "a".into(), vec![1.0, 0.0], Metadata::new()).unwrap();
        db.insert_record(collection_id, group_id, "b".into(), vec![0.0, 1.0], Metadata::new()).unwrap();
        db.delete_group(collection_id, group_id).unwrap();

        let status = db.status(collection_id).unwrap();
        assert_eq!(status.size, 0);
        assert_eq!(status.data_version, 3); // 2 inserts + 1 cascade delete
    }

    #[test]
    fn test_query_without_index_scans_flat() {
        let (db, collection_id, group_id) = new_db_with_collection(3);
        let a = db.insert_record(collection_id, group_id, "a".into(), vec![1.0, 0.0, 0.0], Metadata::new()).unwrap();
        db.insert_record(collection_id, group_id, "b".into(), vec![0.0, 1.0, 0.0], Metadata::new()).unwrap();

        let result = db.query(collection_id, query_params(vec![1.0, 0.0, 0.0], 1)).unwrap();
        assert_eq!(result.hits[0].id, a);
    }

    #[test]
    fn test_build_then_query_serves_from_index() {
        let (db, collection_id, group_id) = new_db_with_collection(3);
        db.insert_record(collection_id, group_id, "a".into(), vec![1.0, 0.0, 0.0], Metadata::new()).unwrap();
        db.build(collection_id, IndexType::Flat, None, ExecutionGuard::none()).unwrap();

        // Rebuild runs on rayon's pool; poll status until it installs.
        for _ in 0..1000 {
            if !db.status(collection_id).unwrap().rebuild_in_progress {
                break;
            }
            std::thread::yield_now();
        }

        let status = db.status(collection_id).unwrap();
        assert!(!status.stale);
        assert_eq!(status.index_type, Some(IndexType::Flat));
    }

    #[test]
    fn test_auto_rebuild_on_staleness_preserves_installed_index_type() {
        let (db, collection_id, group_id) = new_db_with_collection(3);
        db.insert_record(collection_id, group_id, "a".into(), vec![1.0, 0.0, 0.0], Metadata::new())
            .unwrap();

        db.build(collection_id, IndexType::KdTree, None, ExecutionGuard::none()).unwrap();
        for _ in 0..1000 {
            if !db.status(collection_id).unwrap().rebuild_in_progress {
                break;
            }
            std::thread::yield_now();
        }
        assert_eq!(db.status(collection_id).unwrap().index_type, Some(IndexType::KdTree));

        db.insert_record(collection_id, group_id, "b".into(), vec![0.0, 1.0, 0.0], Metadata::new())
            .unwrap();
        assert!(db.status(collection_id).unwrap().stale);

        let mut params = query_params(vec![1.0, 0.0, 0.0], 1);
        params.use_fallback_on_stale = true;
        db.query(collection_id, params).unwrap();

        for _ in 0..1000 {
            if !db.status(collection_id).unwrap().rebuild_in_progress {
                break;
            }
            std::thread::yield_now();
        }
        assert_eq!(db.status(collection_id).unwrap().index_type, Some(IndexType::KdTree));
    }

    #[test]
    fn test_export_import_round_trip() {
        let (db, collection_id, group_id) = new_db_with_collection(2);
        db.insert_record(collection_id, group_id, "a".into(), vec![1.0, 0.0], Metadata::new()).unwrap();
        let snapshot = db.export_snapshot(collection_id).unwrap();
        assert_eq!(snapshot.records.len(), 1);

        let db2 = VectorDb::new();
        db2.register_replica_collection(snapshot.collection.clone()).unwrap();
        db2.import_snapshot(snapshot).unwrap();
        assert_eq!(db2.status(collection_id).unwrap().size, 1);
    }
}
