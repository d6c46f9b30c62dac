//! Text-to-vector conversion is an external collaborator per the core's
//! contract: the core validates dimension on return but never embeds text
//! itself.

use vortex_core::Result;

pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimension(&self) -> usize;
}

/// A deterministic hashing-based stand-in for a real embedding model.
/// Good enough for tests and demos: same text always maps to the same
/// vector, and distinct texts are very unlikely to collide.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use std::hash::{Hash, Hasher};

        let mut out = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let bits = hasher.finish();
            // Map into [-1, 1) from the low 32 bits.
            let v = (bits as u32 as f64 / u32::MAX as f64) * 2.0 - 1.0;
            out.push(v as f32);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
