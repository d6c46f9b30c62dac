//! The record type: text + embedding + metadata, the indexable unit.

use serde::{Deserialize, Serialize};

use crate::ids::{CollectionId, GroupId, RecordId};
use crate::metadata::Metadata;

/// A single indexable record.
///
/// `embedding` is always the unit-normalized form; normalization happens at
/// intake (spec.md §9's resolved open question), so this is the only form
/// the index family ever sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub collection_id: CollectionId,
    pub group_id: GroupId,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

impl Record {
    pub(crate) fn new(
        collection_id: CollectionId,
        group_id: GroupId,
        text: String,
        embedding: Vec<f32>,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: crate::ids::new_id(),
            collection_id,
            group_id,
            text,
            embedding,
            metadata,
        }
    }
}

/// A patch for updating a record. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub author: Option<Option<String>>,
    pub tags: Option<std::collections::BTreeSet<String>>,
    pub source: Option<Option<String>>,
}

impl RecordPatch {
    /// Returns true if this patch changes the embedding, which always bumps
    /// `data_version` and invalidates any cached index entry for this id.
    pub fn changes_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    /// Returns true if the patch touches anything at all. An empty patch is
    /// rejected by the store as `InvalidArgument`.
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.embedding.is_none()
            && self.author.is_none()
            && self.tags.is_none()
            && self.source.is_none()
    }
}
