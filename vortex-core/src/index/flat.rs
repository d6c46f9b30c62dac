//! `FlatIndex` — exact brute-force cosine search (spec.md §4.2.1).
//!
//! The correctness oracle for the other two index types and the fallback
//! path for filtered queries: `build` is O(n), `insert` is O(1) amortized,
//! `remove` swaps the target with the last entry and truncates (O(1)),
//! `search` scores every entry (O(n*d)).

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::ids::RecordId;
use crate::index::{IndexHit, VectorIndex};
use crate::vecmath::{cosine_similarity, TopK};

pub struct FlatIndex {
    dimension: usize,
    ids: Vec<RecordId>,
    vectors: Vec<Vec<f32>>,
    positions: HashMap<RecordId, usize>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            vectors: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn check_dimension(&self, v: &[f32]) -> Result<()> {
        if v.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: v.len(),
            });
        }
        Ok(())
    }
}

impl VectorIndex for FlatIndex {
    fn build(&mut self, vectors: &[(RecordId, Vec<f32>)]) -> Result<()> {
        for (_, v) in vectors {
            self.check_dimension(v)?;
        }
        self.ids.clear();
        self.vectors.clear();
        self.positions.clear();
        for (id, v) in vectors {
            self.positions.insert(*id, self.ids.len());
            self.ids.push(*id);
            self.vectors.push(v.clone());
        }
        Ok(())
    }

    fn insert(&mut self, id: RecordId, vector: Vec<f32>) -> Result<()> {
        self.check_dimension(&vector)?;
        if let Some(&pos) = self.positions.get(&id) {
            self.vectors[pos] = vector;
            return Ok(());
        }
        self.positions.insert(id, self.ids.len());
        self.ids.push(id);
        self.vectors.push(vector);
        Ok(())
    }

    fn remove(&mut self, id: RecordId) -> bool {
        let Some(pos) = self.positions.remove(&id) else {
            return false;
        };
        let last = self.ids.len() - 1;
        self.ids.swap(pos, last);
        self.vectors.swap(pos, last);
        self.ids.pop();
        self.vectors.pop();
        if pos != last {
            self.positions.insert(self.ids[pos], pos);
        }
        true
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        if self.ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(query)?;

        let mut topk: TopK<RecordId> = TopK::new(k);
        for (id, v) in self.ids.iter().zip(self.vectors.iter()) {
            topk.push(*id, cosine_similarity(query, v));
        }
        Ok(topk
            .into_sorted_vec()
            .into_iter()
            .map(|s| IndexHit {
                id: s.id,
                similarity: s.similarity,
            })
            .collect())
    }

    fn size(&self) -> usize {
        self.ids.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn id(n: u8) -> RecordId {
        Uuid::from_bytes([n; 16])
    }

    fn make_index() -> (FlatIndex, [RecordId; 3]) {
        let mut index = FlatIndex::new(3);
        let ids = [id(1), id(2), id(3)];
        index.insert(ids[0], vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(ids[1], vec![0.0, 1.0, 0.0]).unwrap();
        index.insert(ids[2], vec![0.0, 0.0, 1.0]).unwrap();
        (index, ids)
    }

    #[test]
    fn test_exact_match_and_tiebreak() {
        let (index, ids) = make_index();
        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, ids[0]);
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
        // ids[1] and ids[2] tie at similarity 0.0: lower id wins.
        let expected_second = ids[1].min(ids[2]);
        assert_eq!(results[1].id, expected_second);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = FlatIndex::new(3);
        let err = index.insert(id(1), vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_remove_then_search_excludes() {
        let (mut index, ids) = make_index();
        assert!(index.remove(ids[0]));
        assert!(!index.remove(ids[0]));
        let results = index.search(&[1.0, 0.0, 0.0], 3).unwrap();
        assert!(results.iter().all(|r| r.id != ids[0]));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_insert_then_remove_all_is_empty() {
        let (mut index, ids) = make_index();
        for id in ids {
            assert!(index.remove(id));
        }
        assert_eq!(index.size(), 0);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 5).unwrap(), Vec::new());
    }

    #[test]
    fn test_update_is_remove_then_insert() {
        let (mut index, ids) = make_index();
        let found = index.update(ids[0], vec![0.0, 0.0, 1.0]).unwrap();
        assert!(found);
        let results = index.search(&[0.0, 0.0, 1.0], 1).unwrap();
        // ids[0] now ties with ids[2]; lower id wins the tiebreak.
        assert_eq!(results[0].id, ids[0].min(ids[2]));
    }

    #[test]
    fn test_k_ge_n_returns_all_sorted() {
        let (index, _) = make_index();
        let results = index.search(&[1.0, 0.0, 0.0], 100).unwrap();
        assert_eq!(results.len(), 3);
        for w in results.windows(2) {
            assert!(w[0].similarity >= w[1].similarity);
        }
    }
}
