//! Vector math primitives: normalization, cosine similarity, squared-L2
//! distance, and the bounded top-k container used by every index's `search`.
//!
//! Every embedding the core stores is unit-normalized on ingress (§3 of the
//! design spec), so the whole index family ranks purely by cosine similarity.
//! Squared-L2 between two unit vectors equals `2 - 2*cos`, which is what lets
//! `KdTreeIndex` prune on L2 distance and still report exact cosine scores.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{Error, Result};

/// Computes the dot product of two equal-length slices.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Computes the L2 norm of a vector.
#[inline]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Normalizes a vector to unit length.
///
/// Returns `InvalidArgument` for a zero-magnitude vector rather than
/// silently accepting it, per the open question in the design notes: zero
/// vectors are rejected at intake, not flagged-and-kept.
pub fn normalize(v: &[f32]) -> Result<Vec<f32>> {
    let n = norm(v);
    if n == 0.0 {
        return Err(Error::InvalidArgument(
            "cannot normalize a zero-magnitude embedding".into(),
        ));
    }
    Ok(v.iter().map(|x| x / n).collect())
}

/// Cosine similarity between two vectors, assumed already unit-normalized.
///
/// Range `[-1, 1]`. Callers that cannot guarantee normalization should call
/// [`normalize`] first; this function does not re-normalize, matching the
/// "the core treats embeddings as unit-normalized on ingress" invariant.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    dot(a, b)
}

/// Squared-L2 distance between two unit vectors via the `2 - 2*cos` identity.
///
/// Ranking ascending by this value is identical to ranking descending by
/// [`cosine_similarity`] on unit vectors, so `KdTreeIndex` can prune on L2
/// while `search` still reports cosine scores.
#[inline]
pub fn squared_l2_from_cosine(cos: f32) -> f32 {
    2.0 - 2.0 * cos
}

/// Squared-L2 distance computed directly from two vectors.
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// A single scored candidate, ordered by descending similarity with ties
/// broken by ascending id for determinism (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored<Id> {
    pub id: Id,
    pub similarity: f32,
}

impl<Id: Ord + Copy> Eq for Scored<Id> {}

impl<Id: Ord + Copy> PartialOrd for Scored<Id> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Id: Ord + Copy> Ord for Scored<Id> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.similarity
            .partial_cmp(&other.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A bounded max-heap that keeps the k best-scoring candidates seen so far.
///
/// Internally a min-heap over [`Scored`]'s reversed order so that the worst
/// of the retained top-k sits at the root and can be evicted in O(log k).
pub struct TopK<Id: Ord + Copy> {
    k: usize,
    heap: BinaryHeap<std::cmp::Reverse<Scored<Id>>>,
}

impl<Id: Ord + Copy> TopK<Id> {
    /// Creates a container that retains at most `k` candidates.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.max(1)),
        }
    }

    /// Offers a candidate. It is kept if there is room or it beats the
    /// current worst kept candidate.
    pub fn push(&mut self, id: Id, similarity: f32) {
        if self.k == 0 {
            return;
        }
        let candidate = Scored { id, similarity };
        if self.heap.len() < self.k {
            self.heap.push(std::cmp::Reverse(candidate));
        } else if let Some(std::cmp::Reverse(worst)) = self.heap.peek() {
            if candidate > *worst {
                self.heap.pop();
                self.heap.push(std::cmp::Reverse(candidate));
            }
        }
    }

    /// The current worst similarity retained, if the container is full.
    pub fn threshold(&self) -> Option<f32> {
        if self.heap.len() < self.k {
            None
        } else {
            self.heap.peek().map(|std::cmp::Reverse(s)| s.similarity)
        }
    }

    /// Consumes the container, returning results sorted by descending
    /// similarity with ties broken by ascending id.
    pub fn into_sorted_vec(self) -> Vec<Scored<Id>> {
        let mut v: Vec<Scored<Id>> = self.heap.into_iter().map(|r| r.0).collect();
        v.sort_by(|a, b| b.cmp(a));
        v
    }
}
