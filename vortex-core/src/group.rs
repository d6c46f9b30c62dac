//! The group type: an organizational middle tier within a collection.
//!
//! Groups exist only as a filter dimension and for cascading deletes
//! (spec.md §3) — the core never ranks or scores them directly.

use serde::{Deserialize, Serialize};

use crate::ids::{CollectionId, GroupId};
use crate::metadata::Metadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub collection_id: CollectionId,
    pub title: String,
    pub metadata: Metadata,
}

impl Group {
    pub(crate) fn new(collection_id: CollectionId, title: String, metadata: Metadata) -> Self {
        Self {
            id: crate::ids::new_id(),
            collection_id,
            title,
            metadata,
        }
    }
}

/// A patch for updating a group. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct GroupPatch {
    pub title: Option<String>,
    pub author: Option<Option<String>>,
    pub tags: Option<std::collections::BTreeSet<String>>,
    pub source: Option<Option<String>>,
}

impl GroupPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.author.is_none() && self.tags.is_none() && self.source.is_none()
    }
}
