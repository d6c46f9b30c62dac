//! `KdTreeIndex` — exact, space-partitioning k-d tree (spec.md §4.2.2).
//!
//! Splits cycle through axes at each depth (no variance sampling), which
//! keeps `build` a straightforward recursive median-split with no extra
//! bookkeeping. Leaves cap at [`LEAF_CAPACITY`] points. Deletion is a
//! tombstone: the point stays in the backing store (so existing tree node
//! indices remain valid) and is skipped during search; insertion appends to
//! an overflow list that is brute-force scanned alongside the tree. Once
//! tombstones plus overflow exceed [`REBUILD_THRESHOLD`] of the live set, the
//! next mutation triggers a full rebuild that compacts the store and
//! re-partitions from scratch.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::ids::RecordId;
use crate::index::{IndexHit, VectorIndex};
use crate::vecmath::{cosine_similarity, squared_l2_from_cosine, TopK};

const LEAF_CAPACITY: usize = 16;
const REBUILD_THRESHOLD: f64 = 0.25;

struct Node {
    bbox_min: Vec<f32>,
    bbox_max: Vec<f32>,
    content: NodeContent,
}

enum NodeContent {
    Leaf(Vec<usize>),
    Internal {
        axis: usize,
        split: f32,
        left: Box<Node>,
        right: Box<Node>,
    },
}

pub struct KdTreeIndex {
    dimension: usize,
    store: Vec<(RecordId, Vec<f32>)>,
    positions: HashMap<RecordId, usize>,
    tombstones: HashSet<usize>,
    overflow: Vec<usize>,
    tree: Option<Node>,
}

impl KdTreeIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            store: Vec::new(),
            positions: HashMap::new(),
            tombstones: HashSet::new(),
            overflow: Vec::new(),
            tree: None,
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

    fn live_count(&self) -> usize {
        self.positions.len()
    }

    fn needs_rebuild(&self) -> bool {
        let denom = self.live_count().max(1) as f64;
        let dirty = (self.tombstones.len() + self.overflow.len()) as f64;
        dirty / denom > REBUILD_THRESHOLD
    }

    /// Compacts the store to exactly the live entries and re-partitions.
    fn rebuild(&mut self) {
        let live: Vec<(RecordId, Vec<f32>)> = self
            .positions
            .keys()
            .map(|id| {
                let pos = self.positions[id];
                self.store[pos].clone()
            })
            .collect();

        self.store = live;
        self.positions = self
            .store
            .iter()
            .enumerate()
            .map(|(pos, (id, _))| (*id, pos))
            .collect();
        self.tombstones.clear();
        self.overflow.clear();

        if self.store.is_empty() {
            self.tree = None;
            return;
        }
        let indices: Vec<usize> = (0..self.store.len()).collect();
        self.tree = Some(Self::build_node(&self.store, indices, 0, self.dimension));
    }

    fn build_node(store: &[(RecordId, Vec<f32>)], indices: Vec<usize>, depth: usize, dim: usize) -> Node {
        let (bbox_min, bbox_max) = Self::bbox(store, &indices, dim);

        if indices.len() <= LEAF_CAPACITY {
            return Node {
                bbox_min,
                bbox_max,
                content: NodeContent::Leaf(indices),
            };
        }

        let axis = depth % dim;
        let mut sorted = indices;
        sorted.sort_by(|&a, &b| store[a].1[axis].partial_cmp(&store[b].1[axis]).unwrap());
        let mid = sorted.len() / 2;
        let split = store[sorted[mid]].1[axis];
        let (left_idx, right_idx) = sorted.split_at(mid);

        let left = Box::new(Self::build_node(store, left_idx.to_vec(), depth + 1, dim));
        let right = Box::new(Self::build_node(store, right_idx.to_vec(), depth + 1, dim));

        Node {
            bbox_min,
            bbox_max,
            content: NodeContent::Internal {
                axis,
                split,
                left,
                right,
            },
        }
    }

    fn bbox(store: &[(RecordId, Vec<f32>)], indices: &[usize], dim: usize) -> (Vec<f32>, Vec<f32>) {
        let mut min = vec![f32::INFINITY; dim];
        let mut max = vec![f32::NEG_INFINITY; dim];
        for &idx in indices {
            let v = &store[idx].1;
            for d in 0..dim {
                if v[d] < min[d] {
                    min[d] = v[d];
                }
                if v[d] > max[d] {
                    max[d] = v[d];
                }
            }
        }
        (min, max)
    }

    fn bbox_min_dist(query: &[f32], bbox_min: &[f32], bbox_max: &[f32]) -> f32 {
        query
            .iter()
            .zip(bbox_min)
            .zip(bbox_max)
            .map(|((q, lo), hi)| {
                if *q < *lo {
                    (lo - q).powi(2)
                } else if *q > *hi {
                    (q - hi).powi(2)
                } else {
                    0.0
                }
            })
            .sum()
    }

    fn search_node(node: &Node, store: &[(RecordId, Vec<f32>)], tombstones: &HashSet<usize>, query: &[f32], topk: &mut TopK<usize>) {
        if let Some(threshold) = topk.threshold() {
            let max_l2 = squared_l2_from_cosine(threshold);
            if Self::bbox_min_dist(query, &node.bbox_min, &node.bbox_max) > max_l2 {
                return;
            }
        }
        match &node.content {
            NodeContent::Leaf(indices) => {
                for &idx in indices {
                    if tombstones.contains(&idx) {
                        continue;
                    }
                    let sim = cosine_similarity(query, &store[idx].1);
                    topk.push(idx, sim);
                }
            }
            NodeContent::Internal { axis, split, left, right } => {
                let (first, second) = if query[*axis] <= *split {
                    (left, right)
                } else {
                    (right, left)
                };
                Self::search_node(first, store, tombstones, query, topk);
                Self::search_node(second, store, tombstones, query, topk);
            }
        }
    }
}

impl VectorIndex for KdTreeIndex {
    fn build(&mut self, vectors: &[(RecordId, Vec<f32>)]) -> Result<()> {
        for (_, v) in vectors {
            self.check_dimension(v)?;
        }
        self.store = vectors.to_vec();
        self.positions = self
            .store
            .iter()
            .enumerate()
            .map(|(pos, (id, _))| (*id, pos))
            .collect();
        self.tombstones.clear();
        self.overflow.clear();

        if self.store.is_empty() {
            self.tree = None;
            return Ok(());
        }
        let indices: Vec<usize> = (0..self.store.len()).collect();
        self.tree = Some(Self::build_node(&self.store, indices, 0, self.dimension));
        Ok(())
    }

    fn insert(&mut self, id: RecordId, vector: Vec<f32>) -> Result<()> {
        self.check_dimension(&vector)?;
        if let Some(&pos) = self.positions.get(&id) {
            self.store[pos].1 = vector;
            if !self.overflow.contains(&pos) {
                self.overflow.push(pos);
            }
            return Ok(());
        }
        let pos = self.store.len();
        self.store.push((id, vector));
        self.positions.insert(id, pos);
        self.overflow.push(pos);

        if self.needs_rebuild() {
            self.rebuild();
        }
        Ok(())
    }

    fn remove(&mut self, id: RecordId) -> bool {
        let Some(pos) = self.positions.remove(&id) else {
            return false;
        };
        self.tombstones.insert(pos);
        self.overflow.retain(|&p| p != pos);

        if self.needs_rebuild() {
            self.rebuild();
        }
        true
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        if self.live_count() == 0 || k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(query)?;

        let mut topk: TopK<usize> = TopK::new(k);
        if let Some(tree) = &self.tree {
            Self::search_node(tree, &self.store, &self.tombstones, query, &mut topk);
        }
        for &pos in &self.overflow {
            if self.tombstones.contains(&pos) {
                continue;
            }
            let sim = cosine_similarity(query, &self.store[pos].1);
            topk.push(pos, sim);
        }

        Ok(topk
            .into_sorted_vec()
            .into_iter()
            .map(|s| IndexHit {
                id: self.store[s.id].0,
                similarity: s.similarity,
            })
            .collect())
    }

    fn size(&self) -> usize {
        self.live_count()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FlatIndex;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use uuid::Uuid;

    fn id(n: u8) -> RecordId {
        Uuid::from_bytes([n; 16])
    }

    #[test]
    fn test_exact_match_and_dimension_mismatch() {
        let mut index = KdTreeIndex::new(3);
        index.insert(id(1), vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(id(2), vec![0.0, 1.0, 0.0]).unwrap();
        index.insert(id(3), vec![0.0, 0.0, 1.0]).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].id, id(1));

        let err = index.insert(id(4), vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn test_remove_then_search_excludes() {
        let mut index = KdTreeIndex::new(2);
        index.insert(id(1), vec![1.0, 0.0]).unwrap();
        index.insert(id(2), vec![0.0, 1.0]).unwrap();
        assert!(index.remove(id(1)));
        assert!(!index.remove(id(1)));
        let results = index.search(&[1.0, 0.0], 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id(2));
    }

    #[test]
    fn test_matches_flat_index_on_random_data() {
        let mut rng = StdRng::seed_from_u64(42);
        let dim = 8;
        let mut kd = KdTreeIndex::new(dim);
        let mut flat = FlatIndex::new(dim);

        let mut ids = Vec::new();
        for i in 0..200u32 {
            let v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let norm = crate::vecmath::normalize(&v).unwrap();
            let rid = Uuid::from_u128(i as u128 + 1);
            ids.push(rid);
            kd.insert(rid, norm.clone()).unwrap();
            flat.insert(rid, norm).unwrap();
        }

        for _ in 0..10 {
            let q: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let q = crate::vecmath::normalize(&q).unwrap();
            let kd_results = kd.search(&q, 5).unwrap();
            let flat_results = flat.search(&q, 5).unwrap();
            assert_eq!(kd_results.len(), flat_results.len());
            for (a, b) in kd_results.iter().zip(flat_results.iter()) {
                assert_eq!(a.id, b.id);
                assert!((a.similarity - b.similarity).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_rebuild_keeps_dirty_ratio_under_threshold() {
        let mut index = KdTreeIndex::new(2);
        for i in 0..40u32 {
            index.insert(Uuid::from_u128(i as u128), vec![i as f32, 0.0]).unwrap();
            assert!(!index.needs_rebuild(), "insert should rebuild before returning if over threshold");
        }
        for i in 0..20u32 {
            assert!(index.remove(Uuid::from_u128(i as u128)));
            assert!(!index.needs_rebuild(), "remove should rebuild before returning if over threshold");
        }
        assert_eq!(index.size(), 20);
        let results = index.search(&[39.0, 0.0], 1).unwrap();
        assert_eq!(results[0].id, Uuid::from_u128(39));
    }

    #[test]
    fn test_empty_index_search_returns_empty() {
        let index = KdTreeIndex::new(3);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 5).unwrap(), Vec::new());
    }
}
