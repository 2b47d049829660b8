use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A dense embedding vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    #[inline]
    #[must_use]
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    #[inline]
    #[must_use]
    pub fn from_slice(data: &[f32]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    /// Cosine similarity; 0.0 for mismatched dimensions or zero vectors
    #[inline]
    pub fn cosine_similarity(&self, other: &Vector) -> f32 {
        cosine_similarity(&self.data, &other.data)
    }

    /// Normalize in place to unit length. Zero vectors are left untouched.
    #[inline]
    pub fn normalize(&mut self) {
        normalize_in_place(&mut self.data);
    }

    #[inline]
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut v = self.clone();
        v.normalize();
        v
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}

/// Contiguous storage for fixed-dimension, unit-length vectors.
///
/// Row `i` belongs to the `i`-th record of the owning snapshot.
#[derive(Debug, Clone)]
pub struct FlatVectors {
    data: Vec<f32>,
    dim: usize,
}

impl FlatVectors {
    /// Copy and normalize `rows` in parallel. Every row must be `dim` long.
    pub fn from_rows<'a, I>(dim: usize, rows: I) -> Self
    where
        I: IndexedParallelIterator<Item = &'a [f32]>,
    {
        let mut data = vec![0.0f32; rows.len() * dim];
        if dim > 0 {
            data.par_chunks_mut(dim)
                .zip(rows)
                .for_each(|(dst, src)| {
                    dst.copy_from_slice(src);
                    normalize_in_place(dst);
                });
        }
        Self { data, dim }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn len(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Dot product between a unit-length query and row `idx`
    #[inline(always)]
    pub fn similarity(&self, query: &[f32], idx: usize) -> f32 {
        crate::simd::dot_product_simd(query, self.row(idx))
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot = crate::simd::dot_product_simd(a, b);
    let norm_a = crate::simd::norm_simd(a);
    let norm_b = crate::simd::norm_simd(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

pub(crate) fn normalize_in_place(data: &mut [f32]) {
    let norm = crate::simd::norm_simd(data);
    if norm > f32::EPSILON {
        let inv_norm = 1.0 / norm;
        for x in data.iter_mut() {
            *x *= inv_norm;
        }
    }
}
