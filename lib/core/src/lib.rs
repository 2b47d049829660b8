//! # nearspot Core
//!
//! Core library for nearspot, a location lookup service.
//!
//! This crate provides the indexes and query flows:
//!
//! - [`GeoIndex`] - radius-bounded, distance-ranked point of interest lookup
//! - [`VectorIndex`] - top-k cosine similarity over address embeddings (HNSW)
//! - [`fit_viewport`] - map zoom and center framing a set of points
//! - [`EmbeddingProvider`] - text to vector, with [`HashingEmbedder`] built in
//! - [`QueryCoordinator`] - the nearest-POI and address-suggestion flows
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use nearspot_core::{
//!     CoordinatorConfig, GeoIndex, GeoPoint, HashingEmbedder, NearestOutcome,
//!     PointOfInterest, QueryCoordinator, VectorIndex,
//! };
//!
//! let geo = Arc::new(GeoIndex::default());
//! geo.build(vec![PointOfInterest::new(0, GeoPoint::new(48.8584, 2.2945).unwrap())]).unwrap();
//!
//! let coordinator = QueryCoordinator::new(
//!     geo,
//!     Arc::new(VectorIndex::default()),
//!     Arc::new(HashingEmbedder::default()),
//!     CoordinatorConfig::default(),
//! );
//!
//! let here = GeoPoint::new(48.8530, 2.3499).unwrap();
//! match coordinator.nearest_poi(&here).unwrap() {
//!     NearestOutcome::Found { results, viewport } => {
//!         assert_eq!(results[0].poi.id, 0);
//!         assert!(viewport.zoom <= 20.0);
//!     }
//!     NearestOutcome::NoResults => unreachable!(),
//! }
//! ```

pub mod error;
pub mod geo;
pub mod point;
pub mod vector;
pub mod snapshot;
pub mod geo_index;
pub mod hnsw;
pub mod vector_index;
pub mod viewport;
pub mod embedding;
pub mod coordinator;

/// SIMD-optimized vector operations
///
/// Provides hardware-accelerated dot products:
/// - AVX2/FMA on x86_64
/// - NEON on ARM64/Apple Silicon
pub mod simd;

pub use error::{Error, Result};
pub use geo::{GeoPoint, EARTH_RADIUS_KM};
pub use point::{AddressRecord, Fee, PoiAttributes, PointOfInterest, Wheelchair};
pub use vector::{FlatVectors, Vector};
pub use snapshot::SnapshotCell;
pub use geo_index::{GeoIndex, GeoIndexConfig, ProximityResult};
pub use hnsw::{HnswConfig, HnswIndex};
pub use vector_index::{SemanticMatch, VectorIndex, VectorIndexConfig};
pub use viewport::{fit_viewport, fit_viewport_with, Projection, Viewport};
pub use embedding::{EmbeddingProvider, HashingEmbedder};
pub use coordinator::{AddressSuggestion, CoordinatorConfig, NearestOutcome, QueryCoordinator};
