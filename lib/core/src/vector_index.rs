use ahash::AHashSet;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info};
use crate::hnsw::{HnswConfig, HnswIndex};
use crate::point::AddressRecord;
use crate::snapshot::SnapshotCell;
use crate::vector::{normalize_in_place, FlatVectors};
use crate::{Error, Result};

/// Embedding dimension of the default address model
pub const DEFAULT_DIM: usize = 1024;

/// Number of suggestions returned by default
pub const DEFAULT_K: usize = 10;

/// Candidates considered before final ranking by default
pub const DEFAULT_CANDIDATE_POOL: usize = 100;

/// Configuration for a [`VectorIndex`]
#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub dim: usize,
    /// Build an HNSW graph; when false every query is an exact scan
    pub use_hnsw: bool,
    pub hnsw: HnswConfig,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            dim: DEFAULT_DIM,
            use_hnsw: true,
            hnsw: HnswConfig::default(),
        }
    }
}

/// An address with its cosine similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticMatch {
    pub record: AddressRecord,
    pub score: f32,
}

struct VectorSnapshot {
    /// Sorted by id; row `i` of `vectors` and node `i` of `graph` belong to `records[i]`
    records: Vec<AddressRecord>,
    vectors: FlatVectors,
    graph: Option<HnswIndex>,
}

/// Top-k cosine similarity search over address embeddings
pub struct VectorIndex {
    config: VectorIndexConfig,
    snapshot: SnapshotCell<VectorSnapshot>,
}

impl VectorIndex {
    pub fn new(config: VectorIndexConfig) -> Self {
        Self {
            config,
            snapshot: SnapshotCell::new(),
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.config.dim
    }

    /// Bulk load the index, replacing any previous contents.
    ///
    /// Fails with `DuplicateId` or `DimensionMismatch` before anything is
    /// published.
    pub fn build<I>(&self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = AddressRecord>,
    {
        let snapshot = self.make_snapshot(records.into_iter().collect())?;
        let count = snapshot.records.len();
        let generation = self.snapshot.publish(snapshot);
        info!(records = count, dim = self.config.dim, generation, "vector index built");
        Ok(())
    }

    /// Add records on top of the current data as a new snapshot.
    ///
    /// The graph is rebuilt from the union off to the side; queries keep
    /// using the previous snapshot until the swap.
    pub fn extend<I>(&self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = AddressRecord>,
    {
        let added: Vec<AddressRecord> = records.into_iter().collect();
        let added_count = added.len();
        let generation = self.snapshot.update(|current| {
            let mut all = current.map(|s| s.records.clone()).unwrap_or_default();
            all.extend(added);
            self.make_snapshot(all)
        })?;
        info!(added = added_count, generation, "vector index extended");
        Ok(())
    }

    fn make_snapshot(&self, mut records: Vec<AddressRecord>) -> Result<VectorSnapshot> {
        let dim = self.config.dim;
        let mut seen = AHashSet::with_capacity(records.len());
        for record in &records {
            if record.embedding.dim() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    actual: record.embedding.dim(),
                });
            }
            if !seen.insert(record.id) {
                return Err(Error::DuplicateId(record.id));
            }
        }

        records.par_sort_unstable_by_key(|r| r.id);
        let vectors = FlatVectors::from_rows(dim, records.par_iter().map(|r| r.embedding.as_slice()));
        let graph = self
            .config
            .use_hnsw
            .then(|| HnswIndex::build(self.config.hnsw.clone(), &vectors));

        Ok(VectorSnapshot {
            records,
            vectors,
            graph,
        })
    }

    /// The `k` records most similar to `query`, best first.
    ///
    /// `candidate_pool` bounds how many graph nodes the approximate search
    /// keeps before the final ranking. Ties on score are broken by ascending
    /// id, and the ordering is identical across calls on the same snapshot.
    pub fn top_k(&self, query: &[f32], k: usize, candidate_pool: usize) -> Result<Vec<SemanticMatch>> {
        if k == 0 || k > candidate_pool {
            return Err(Error::InvalidK { k, candidate_pool });
        }
        if query.len() != self.config.dim {
            return Err(Error::DimensionMismatch {
                expected: self.config.dim,
                actual: query.len(),
            });
        }
        let snapshot = self.snapshot.load()?;

        let mut query = query.to_vec();
        normalize_in_place(&mut query);

        let n = snapshot.records.len();
        let wanted = k.min(n);

        let approximate = match &snapshot.graph {
            Some(graph) if n > candidate_pool => {
                let found: Vec<usize> = graph
                    .search(&snapshot.vectors, &query, candidate_pool)
                    .into_iter()
                    .map(|(row, _)| row)
                    .collect();
                (found.len() >= wanted).then_some(found)
            }
            _ => None,
        };
        let exact = approximate.is_none();

        let mut ranked: Vec<(usize, f32)> = match approximate {
            Some(rows) => rows
                .into_iter()
                .map(|row| (row, snapshot.vectors.similarity(&query, row)))
                .collect(),
            None => (0..n)
                .into_par_iter()
                .map(|row| (row, snapshot.vectors.similarity(&query, row)))
                .collect(),
        };

        if ranked.len() > wanted && wanted > 0 {
            ranked.select_nth_unstable_by(wanted - 1, compare_ranked);
            ranked.truncate(wanted);
        }
        ranked.sort_unstable_by(compare_ranked);
        ranked.truncate(wanted);

        debug!(k, candidate_pool, exact, returned = ranked.len(), "top-k query");

        Ok(ranked
            .into_iter()
            .map(|(row, score)| SemanticMatch {
                record: snapshot.records[row].clone(),
                score,
            })
            .collect())
    }

    /// Number of records in the current snapshot (0 before the first build)
    pub fn len(&self) -> usize {
        self.snapshot.load().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_built(&self) -> bool {
        self.snapshot.is_loaded()
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new(VectorIndexConfig::default())
    }
}

/// Higher score first; rows are in id order, so the row breaks ties by id
fn compare_ranked(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}
