//! The pluggable index family: one `VectorIndex` contract, three
//! implementations (spec.md §4.2).

pub mod flat;
pub mod kdtree;
pub mod lsh;

pub use flat::FlatIndex;
pub use kdtree::KdTreeIndex;
pub use lsh::{LshConfig, LshIndex};

use crate::collection::IndexType;
use crate::error::Result;
use crate::ids::RecordId;

/// Constructs a fresh, empty index instance of the given type. `lsh_config`
/// is the construction parameter set spec.md §6's `build(..., params)`
/// refers to; it is only consulted for `IndexType::Lsh` and defaulted
/// otherwise.
pub fn new_index(index_type: IndexType, dimension: usize, lsh_config: Option<LshConfig>) -> Box<dyn VectorIndex> {
    match index_type {
        IndexType::Flat => Box::new(FlatIndex::new(dimension)),
        IndexType::KdTree => Box::new(KdTreeIndex::new(dimension)),
        IndexType::Lsh => Box::new(LshIndex::new(dimension, lsh_config.unwrap_or_default())),
    }
}

/// A single scored hit from a `search` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHit {
    pub id: RecordId,
    pub similarity: f32,
}

/// The contract every index implementation satisfies (spec.md §4.2 table).
///
/// All three implementations assume their inputs are already unit-normalized
/// — normalization happens once, at record intake, not inside the index.
pub trait VectorIndex: Send + Sync {
    /// Replaces any prior content. Deterministic given inputs and
    /// construction parameters.
    fn build(&mut self, vectors: &[(RecordId, Vec<f32>)]) -> Result<()>;

    /// Inserts a single record. A subsequent `search` sees it.
    fn insert(&mut self, id: RecordId, vector: Vec<f32>) -> Result<()>;

    /// Removes a record by id. Returns whether it was found.
    fn remove(&mut self, id: RecordId) -> bool;

    /// Equivalent to `remove` then `insert`.
    fn update(&mut self, id: RecordId, vector: Vec<f32>) -> Result<bool> {
        let found = self.remove(id);
        self.insert(id, vector)?;
        Ok(found)
    }

    /// Returns up to `k` hits sorted by descending cosine similarity, ties
    /// broken by ascending id. Never errors on an empty index; returns `[]`.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>>;

    /// Current number of indexed records.
    fn size(&self) -> usize;

    /// The committed dimension for this index instance.
    fn dimension(&self) -> usize;
}
