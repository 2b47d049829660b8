//! # nearspot
//!
//! A location lookup service: given a position it returns the nearest points
//! of interest together with a map viewport that frames them, and given free
//! text it suggests matching street addresses by embedding similarity.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! nearspot serve --pois toilets.json --addresses addresses.bin --port 8050
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use nearspot::prelude::*;
//! use std::sync::Arc;
//!
//! let (pois, _) = nearspot::ingest::load_pois("toilets.json").unwrap();
//! let geo = Arc::new(GeoIndex::default());
//! geo.build(pois).unwrap();
//!
//! let coordinator = QueryCoordinator::new(
//!     geo,
//!     Arc::new(VectorIndex::default()),
//!     Arc::new(HashingEmbedder::default()),
//!     CoordinatorConfig::default(),
//! );
//! let here = GeoPoint::new(48.8530, 2.3499).unwrap();
//! if let NearestOutcome::Found { results, viewport } = coordinator.nearest_poi(&here).unwrap() {
//!     println!("{} results, zoom {}", results.len(), viewport.zoom);
//! }
//! ```
//!
//! ## Crate Structure
//!
//! - `nearspot-core` - geometry, the geo and vector indexes, viewport fitting,
//!   embedding providers and the query coordinator
//! - `nearspot-ingest` - address stream and point of interest export loaders
//! - `nearspot-api` - actix-web REST endpoints

// Re-export core types
pub use nearspot_core::{
    fit_viewport, fit_viewport_with, AddressRecord, AddressSuggestion, CoordinatorConfig,
    EmbeddingProvider, Error, GeoIndex, GeoIndexConfig, GeoPoint, HashingEmbedder, HnswConfig,
    NearestOutcome, PointOfInterest, ProximityResult, QueryCoordinator, Result, SemanticMatch,
    VectorIndex, VectorIndexConfig, Viewport,
};

// Re-export API
pub use nearspot_api::RestApi;

/// Stream and export loaders
pub use nearspot_ingest as ingest;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AddressRecord, CoordinatorConfig, EmbeddingProvider, Error, GeoIndex, GeoPoint,
        HashingEmbedder, NearestOutcome, PointOfInterest, QueryCoordinator, Result, VectorIndex,
        VectorIndexConfig, Viewport,
    };
}
