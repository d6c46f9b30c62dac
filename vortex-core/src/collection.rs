//! The collection type: the top-level container fixing embedding dimension
//! and default index algorithm (spec.md §3).

use serde::{Deserialize, Serialize};

use crate::ids::CollectionId;
use crate::metadata::Metadata;

/// Which `VectorIndex` implementation a collection builds by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// Exact brute-force scan. The correctness oracle for the other two.
    Flat,
    /// Exact, space-partitioning tree. Best for low-dimensional data.
    KdTree,
    /// Approximate, hyperplane-hashing index. Best for large, high-dim data.
    Lsh,
}

impl std::fmt::Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexType::Flat => write!(f, "FLAT"),
            IndexType::KdTree => write!(f, "KDTREE"),
            IndexType::Lsh => write!(f, "LSH"),
        }
    }
}

/// Collection metadata, immutable apart from `name` and `metadata`.
///
/// The runtime half — `data_version`, `index_version`, the installed index
/// instance and its type tag — lives in the registry's `CollectionEntry`
/// (see `registry.rs`), not here, so there is exactly one place that
/// enforces the `index_version <= data_version` invariant under lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub dimension: usize,
    pub default_index_type: IndexType,
    pub metadata: Metadata,
}

impl Collection {
    pub(crate) fn new(
        name: String,
        dimension: usize,
        default_index_type: IndexType,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: crate::ids::new_id(),
            name,
            dimension,
            default_index_type,
            metadata,
        }
    }
}

/// A patch for updating a collection's mutable fields.
#[derive(Debug, Clone, Default)]
pub struct CollectionPatch {
    pub name: Option<String>,
    pub default_index_type: Option<IndexType>,
}

impl CollectionPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.default_index_type.is_none()
    }
}
