use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use crate::embedding::EmbeddingProvider;
use crate::geo::GeoPoint;
use crate::geo_index::{GeoIndex, ProximityResult, DEFAULT_LIMIT, DEFAULT_RADIUS_KM};
use crate::vector_index::{VectorIndex, DEFAULT_CANDIDATE_POOL, DEFAULT_K};
use crate::viewport::{fit_viewport, Viewport, DEFAULT_WIDTH_TO_HEIGHT};
use crate::Result;

/// Query parameters used by [`QueryCoordinator`]
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub radius_km: f64,
    pub limit: usize,
    pub k: usize,
    pub candidate_pool: usize,
    pub width_to_height: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            radius_km: DEFAULT_RADIUS_KM,
            limit: DEFAULT_LIMIT,
            k: DEFAULT_K,
            candidate_pool: DEFAULT_CANDIDATE_POOL,
            width_to_height: DEFAULT_WIDTH_TO_HEIGHT,
        }
    }
}

/// Outcome of a nearest point of interest lookup
#[derive(Debug, Clone, PartialEq)]
pub enum NearestOutcome {
    Found {
        results: Vec<ProximityResult>,
        viewport: Viewport,
    },
    /// Nothing within the search radius
    NoResults,
}

/// An address suggestion for free-text input
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressSuggestion {
    pub label: String,
    pub coordinate: GeoPoint,
}

/// Runs the two user-facing query flows against shared indexes
pub struct QueryCoordinator {
    geo: Arc<GeoIndex>,
    vectors: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: CoordinatorConfig,
}

impl QueryCoordinator {
    pub fn new(
        geo: Arc<GeoIndex>,
        vectors: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            geo,
            vectors,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Nearest points of interest around `position`, with a viewport framing
    /// them and the position itself.
    pub fn nearest_poi(&self, position: &GeoPoint) -> Result<NearestOutcome> {
        let results = self
            .geo
            .radius_query(position, self.config.radius_km, self.config.limit)?;
        if results.is_empty() {
            debug!(position = %position, "no points of interest in range");
            return Ok(NearestOutcome::NoResults);
        }

        let mut frame: Vec<GeoPoint> = results.iter().map(|r| r.poi.coordinate).collect();
        frame.push(*position);
        let viewport = fit_viewport(&frame, self.config.width_to_height)?;

        Ok(NearestOutcome::Found { results, viewport })
    }

    /// Addresses resembling `text`, best match first.
    ///
    /// Blank input returns no suggestions without calling the embedder.
    pub fn suggest_addresses(&self, text: &str) -> Result<Vec<AddressSuggestion>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed(text)?;
        let matches = self
            .vectors
            .top_k(&query, self.config.k, self.config.candidate_pool)?;
        Ok(matches
            .into_iter()
            .map(|m| AddressSuggestion {
                label: m.record.label,
                coordinate: m.record.coordinate,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::{AddressRecord, PointOfInterest};
    use crate::vector::Vector;
    use crate::vector_index::VectorIndexConfig;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps a text to a one-hot vector on its first byte
    struct FakeEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeEmbedder {
        fn new(fail: bool) -> Self {
            Self { calls: AtomicUsize::new(0), fail }
        }
    }

    impl EmbeddingProvider for FakeEmbedder {
        fn dim(&self) -> usize {
            4
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::EmbeddingFailure("model offline".into()));
            }
            let mut v = vec![0.0; 4];
            v[(text.as_bytes()[0] % 4) as usize] = 1.0;
            Ok(v)
        }
    }

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    fn coordinator(embedder: Arc<FakeEmbedder>) -> QueryCoordinator {
        let geo = Arc::new(GeoIndex::default());
        geo.build(vec![
            PointOfInterest::new(1, point(48.8566, 2.3522)),
            PointOfInterest::new(2, point(48.8606, 2.3376)),
        ])
        .unwrap();

        let vectors = Arc::new(VectorIndex::new(VectorIndexConfig {
            dim: 4,
            use_hnsw: false,
            ..Default::default()
        }));
        vectors
            .build((0..4u64).map(|i| {
                let mut e = vec![0.0; 4];
                e[i as usize] = 1.0;
                AddressRecord::new(i, format!("address {i}"), point(40.0 + i as f64, 3.0), Vector::new(e))
            }))
            .unwrap();

        QueryCoordinator::new(geo, vectors, embedder, CoordinatorConfig::default())
    }

    #[test]
    fn test_nearest_frames_results_and_position() {
        let c = coordinator(Arc::new(FakeEmbedder::new(false)));
        let here = point(48.85, 2.35);
        match c.nearest_poi(&here).unwrap() {
            NearestOutcome::Found { results, viewport } => {
                assert_eq!(results.len(), 2);
                assert_eq!(results[0].poi.id, 1);
                assert!(viewport.zoom > 10.0 && viewport.zoom <= 20.0);
                let frame = [results[0].poi.coordinate, results[1].poi.coordinate, here];
                assert_eq!(viewport, fit_viewport(&frame, 2.0).unwrap());
            }
            NearestOutcome::NoResults => panic!("expected results"),
        }
    }

    #[test]
    fn test_nearest_no_results() {
        let c = coordinator(Arc::new(FakeEmbedder::new(false)));
        assert_eq!(c.nearest_poi(&point(-33.86, 151.2)).unwrap(), NearestOutcome::NoResults);
    }

    #[test]
    fn test_suggest() {
        let embedder = Arc::new(FakeEmbedder::new(false));
        let c = coordinator(embedder.clone());
        // b'a' % 4 == 1
        let suggestions = c.suggest_addresses("a street").unwrap();
        assert_eq!(suggestions.len(), 4);
        assert_eq!(suggestions[0].label, "address 1");
        assert_eq!(suggestions[0].coordinate, point(41.0, 3.0));
        // Remaining scores tie at zero and fall back to id order
        let rest: Vec<&str> = suggestions[1..].iter().map(|s| s.label.as_str()).collect();
        assert_eq!(rest, vec!["address 0", "address 2", "address 3"]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blank_text_skips_embedder() {
        let embedder = Arc::new(FakeEmbedder::new(true));
        let c = coordinator(embedder.clone());
        assert!(c.suggest_addresses("").unwrap().is_empty());
        assert!(c.suggest_addresses(" \t\n").unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_embedding_failure_propagates_once() {
        let embedder = Arc::new(FakeEmbedder::new(true));
        let c = coordinator(embedder.clone());
        assert!(matches!(c.suggest_addresses("rue"), Err(Error::EmbeddingFailure(_))));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }
}
