use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use crate::vector::FlatVectors;

/// Tuning knobs for the HNSW graph
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Links kept per node on upper layers; layer 0 keeps twice as many
    pub max_connections: usize,
    pub max_layers: usize,
    pub ef_construction: usize,
    /// Seed for level assignment, so identical inputs give identical graphs
    pub seed: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            max_layers: 4,
            ef_construction: 200,
            seed: 0x5eed_0f_a11,
        }
    }
}

/// Bit vector for visited node tracking
struct VisitedSet {
    bits: Vec<u64>,
}

impl VisitedSet {
    #[inline]
    fn new(capacity: usize) -> Self {
        Self {
            bits: vec![0; capacity.div_ceil(64)],
        }
    }

    /// Returns true if `idx` was not yet visited
    #[inline]
    fn insert(&mut self, idx: usize) -> bool {
        let word = &mut self.bits[idx / 64];
        let mask = 1u64 << (idx % 64);
        let fresh = *word & mask == 0;
        *word |= mask;
        fresh
    }
}

/// A node with its distance to the current query.
///
/// Ordered by distance, then node index, so heap operations are fully
/// deterministic even when distances tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Scored {
    dist: OrderedFloat<f32>,
    idx: usize,
}

type Links = SmallVec<[Vec<u32>; 2]>;

/// Hierarchical navigable small world graph over a [`FlatVectors`] slab.
///
/// The graph only stores topology; vectors live in the slab owned by the
/// snapshot, and node `i` is row `i` of that slab. Distance is `1 - dot`
/// on unit-length vectors.
pub struct HnswIndex {
    config: HnswConfig,
    links: Vec<Links>,
    entry_point: Option<usize>,
    top_layer: usize,
    rng: StdRng,
}

impl HnswIndex {
    pub fn new(config: HnswConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            links: Vec::new(),
            entry_point: None,
            top_layer: 0,
            rng,
        }
    }

    /// Build a graph over every row of `vectors`, in row order
    pub fn build(config: HnswConfig, vectors: &FlatVectors) -> Self {
        let mut index = Self::new(config);
        index.links.reserve(vectors.len());
        for idx in 0..vectors.len() {
            index.insert(vectors, idx);
        }
        index
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    #[inline(always)]
    fn distance(vectors: &FlatVectors, query: &[f32], idx: usize) -> f32 {
        1.0 - vectors.similarity(query, idx)
    }

    #[inline]
    fn scored(vectors: &FlatVectors, query: &[f32], idx: usize) -> Scored {
        Scored {
            dist: OrderedFloat(Self::distance(vectors, query, idx)),
            idx,
        }
    }

    /// Exponential decay: each extra layer with probability 1/2
    fn select_layer(&mut self) -> usize {
        let mut layer = 0;
        while layer + 1 < self.config.max_layers && self.rng.random::<f32>() < 0.5 {
            layer += 1;
        }
        layer
    }

    #[inline]
    fn layer_capacity(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.max_connections * 2
        } else {
            self.config.max_connections
        }
    }

    /// Best-first search restricted to one layer.
    ///
    /// Returns up to `ef` nodes sorted nearest first.
    fn search_layer(
        &self,
        vectors: &FlatVectors,
        query: &[f32],
        entry_points: &[usize],
        ef: usize,
        layer: usize,
    ) -> Vec<Scored> {
        let mut visited = VisitedSet::new(self.links.len());
        let mut candidates: BinaryHeap<Reverse<Scored>> = BinaryHeap::with_capacity(ef * 2);
        let mut results: BinaryHeap<Scored> = BinaryHeap::with_capacity(ef + 1);

        for &ep in entry_points {
            if visited.insert(ep) {
                let s = Self::scored(vectors, query, ep);
                candidates.push(Reverse(s));
                results.push(s);
            }
        }
        while results.len() > ef {
            results.pop();
        }

        while let Some(Reverse(current)) = candidates.pop() {
            if results.len() >= ef {
                if let Some(worst) = results.peek() {
                    if current > *worst {
                        break;
                    }
                }
            }

            let Some(neighbors) = self.links[current.idx].get(layer) else {
                continue;
            };

            for &neighbor in neighbors {
                let neighbor = neighbor as usize;
                if !visited.insert(neighbor) {
                    continue;
                }
                let s = Self::scored(vectors, query, neighbor);
                let admit = match results.peek() {
                    Some(worst) => results.len() < ef || s < *worst,
                    None => true,
                };
                if admit {
                    candidates.push(Reverse(s));
                    results.push(s);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Greedy descent from the entry point down to (but excluding) `floor`
    fn descend(&self, vectors: &FlatVectors, query: &[f32], floor: usize) -> Option<usize> {
        let mut ep = self.entry_point?;
        let mut layer = self.top_layer;
        while layer > floor {
            if let Some(best) = self.search_layer(vectors, query, &[ep], 1, layer).first() {
                ep = best.idx;
            }
            layer -= 1;
        }
        Some(ep)
    }

    /// Link row `idx` of `vectors` into the graph.
    ///
    /// Rows must be inserted in order, once each.
    pub fn insert(&mut self, vectors: &FlatVectors, idx: usize) {
        debug_assert_eq!(idx, self.links.len());
        let level = self.select_layer();
        self.links.push((0..=level).map(|_| Vec::new()).collect());

        let Some(ep) = self.descend(vectors, vectors.row(idx), level) else {
            self.entry_point = Some(idx);
            self.top_layer = level;
            return;
        };

        let query = vectors.row(idx);
        let mut entry_points = vec![ep];
        for layer in (0..=level.min(self.top_layer)).rev() {
            let found = self.search_layer(
                vectors,
                query,
                &entry_points,
                self.config.ef_construction,
                layer,
            );
            let neighbors: Vec<u32> = found
                .iter()
                .filter(|s| s.idx != idx)
                .take(self.config.max_connections)
                .map(|s| s.idx as u32)
                .collect();

            let capacity = self.layer_capacity(layer);
            for &neighbor in &neighbors {
                let neighbor = neighbor as usize;
                self.links[neighbor][layer].push(idx as u32);
                if self.links[neighbor][layer].len() > capacity {
                    self.prune(vectors, neighbor, layer, capacity);
                }
            }
            self.links[idx][layer] = neighbors;
            entry_points = found.iter().map(|s| s.idx).collect();
        }

        if level > self.top_layer {
            self.top_layer = level;
            self.entry_point = Some(idx);
        }
    }

    /// Keep only the `capacity` closest links of `node` on `layer`
    fn prune(&mut self, vectors: &FlatVectors, node: usize, layer: usize, capacity: usize) {
        let base = vectors.row(node);
        let mut scored: Vec<Scored> = self.links[node][layer]
            .iter()
            .map(|&n| Self::scored(vectors, base, n as usize))
            .collect();
        scored.sort_unstable();
        scored.truncate(capacity);
        self.links[node][layer] = scored.into_iter().map(|s| s.idx as u32).collect();
    }

    /// Approximate nearest neighbors of a unit-length `query`.
    ///
    /// `ef` is the candidate pool: the search keeps at most `ef` nodes and
    /// returns them as `(row, distance)` pairs sorted nearest first.
    pub fn search(&self, vectors: &FlatVectors, query: &[f32], ef: usize) -> Vec<(usize, f32)> {
        let Some(ep) = self.descend(vectors, query, 0) else {
            return Vec::new();
        };
        self.search_layer(vectors, query, &[ep], ef.max(1), 0)
            .into_iter()
            .map(|s| (s.idx, s.dist.into_inner()))
            .collect()
    }
}
