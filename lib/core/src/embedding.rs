use ahash::RandomState;
use crate::vector::normalize_in_place;
use crate::vector_index::DEFAULT_DIM;
use crate::{Error, Result};

/// Turns free text into an embedding vector.
///
/// Implementations may block (a model call, a remote service). Failures are
/// reported as [`Error::EmbeddingFailure`]; callers do not retry.
pub trait EmbeddingProvider: Send + Sync {
    /// Length of every vector returned by [`embed`](Self::embed)
    fn dim(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Feature-hashing embedder.
///
/// Character trigrams and whole words of the lowercased text are hashed into
/// buckets of a fixed-size vector, words weighted double, and the result is
/// L2-normalized. Needs no model files, and texts sharing spelling end up
/// close to each other. Hash seeds are fixed, so a given build of the
/// program always maps the same text to the same vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
    hasher: RandomState,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            hasher: RandomState::with_seeds(
                0x6e65_6172_7370_6f74,
                0x9e37_79b9_7f4a_7c15,
                0xc2b2_ae3d_27d4_eb4f,
                0x1656_67b1_9e37_79f9,
            ),
        }
    }

    #[inline]
    fn bucket<T: std::hash::Hash>(&self, feature: T) -> usize {
        (self.hasher.hash_one(feature) % self.dim as u64) as usize
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIM)
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dim == 0 {
            return Err(Error::EmbeddingFailure("embedding dimension is zero".into()));
        }
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(Error::EmbeddingFailure("cannot embed empty text".into()));
        }

        let mut vector = vec![0.0f32; self.dim];

        let padded: Vec<char> = format!("  {normalized}  ").chars().collect();
        for trigram in padded.windows(3) {
            vector[self.bucket(trigram)] += 1.0;
        }
        for word in normalized.split_whitespace() {
            vector[self.bucket(word)] += 2.0;
        }

        normalize_in_place(&mut vector);
        Ok(vector)
    }
}
