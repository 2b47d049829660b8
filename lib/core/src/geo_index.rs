use ahash::AHashSet;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info};
use crate::geo::{GeoPoint, KM_PER_DEGREE};
use crate::point::PointOfInterest;
use crate::snapshot::SnapshotCell;
use crate::{Error, Result};

/// Search radius used by callers that do not pick their own
pub const DEFAULT_RADIUS_KM: f64 = 200.0;

/// Result cap used by callers that do not pick their own
pub const DEFAULT_LIMIT: usize = 20;

/// Configuration for a [`GeoIndex`]
#[derive(Debug, Clone)]
pub struct GeoIndexConfig {
    /// Latitude bands with at least this many points are scored on the rayon pool
    pub parallel_threshold: usize,
}

impl Default for GeoIndexConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: 4096,
        }
    }
}

/// A point of interest together with its distance from the query center
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProximityResult {
    pub poi: PointOfInterest,
    pub distance_km: f64,
}

/// Immutable point set sorted by latitude.
///
/// Great-circle distance is never shorter than the arc between the two
/// latitudes, so every point within `r` km of the center lies inside the
/// latitude band `lat ± r / KM_PER_DEGREE`. Only that band is scored.
struct GeoSnapshot {
    points: Vec<PointOfInterest>,
    lats: Vec<f64>,
}

impl GeoSnapshot {
    fn from_records(mut points: Vec<PointOfInterest>) -> Result<Self> {
        let mut seen = AHashSet::with_capacity(points.len());
        for poi in &points {
            if !seen.insert(poi.id) {
                return Err(Error::DuplicateId(poi.id));
            }
        }

        points.par_sort_unstable_by(|a, b| {
            a.coordinate
                .lat()
                .total_cmp(&b.coordinate.lat())
                .then(a.id.cmp(&b.id))
        });
        let lats = points.iter().map(|p| p.coordinate.lat()).collect();

        Ok(Self { points, lats })
    }

    fn band(&self, min_lat: f64, max_lat: f64) -> &[PointOfInterest] {
        let start = self.lats.partition_point(|&lat| lat < min_lat);
        let end = self.lats.partition_point(|&lat| lat <= max_lat);
        &self.points[start..end.max(start)]
    }
}

/// Radius-bounded, distance-ranked point of interest lookup
pub struct GeoIndex {
    config: GeoIndexConfig,
    snapshot: SnapshotCell<GeoSnapshot>,
}

impl GeoIndex {
    pub fn new(config: GeoIndexConfig) -> Self {
        Self {
            config,
            snapshot: SnapshotCell::new(),
        }
    }

    /// Bulk load the index, replacing any previous contents.
    ///
    /// Fails with `DuplicateId` if two records share an id; on failure the
    /// previously published data stays in place.
    pub fn build<I>(&self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = PointOfInterest>,
    {
        let snapshot = GeoSnapshot::from_records(records.into_iter().collect())?;
        let count = snapshot.points.len();
        let generation = self.snapshot.publish(snapshot);
        info!(points = count, generation, "geo index built");
        Ok(())
    }

    /// Add records on top of the current data as a new snapshot.
    ///
    /// Queries already running keep the snapshot they started with.
    pub fn extend<I>(&self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = PointOfInterest>,
    {
        let added: Vec<PointOfInterest> = records.into_iter().collect();
        let added_count = added.len();
        let generation = self.snapshot.update(move |current| {
            let mut points = current.map(|s| s.points.clone()).unwrap_or_default();
            points.extend(added);
            GeoSnapshot::from_records(points)
        })?;
        info!(added = added_count, generation, "geo index extended");
        Ok(())
    }

    /// Points within `radius_km` of `center`, nearest first.
    ///
    /// `center` is in range by construction (see [`GeoPoint::new`]). Ties on
    /// distance are broken by ascending id; the output is truncated to `limit`.
    pub fn radius_query(
        &self,
        center: &GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<ProximityResult>> {
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(Error::InvalidRadius(radius_km));
        }
        let snapshot = self.snapshot.load()?;

        let delta = radius_km / KM_PER_DEGREE;
        let band = snapshot.band(center.lat() - delta, center.lat() + delta);

        let score = |poi: &PointOfInterest| {
            let distance_km = center.distance_km(&poi.coordinate);
            (distance_km <= radius_km).then(|| ProximityResult {
                poi: poi.clone(),
                distance_km,
            })
        };

        let mut results: Vec<ProximityResult> = if band.len() >= self.config.parallel_threshold {
            band.par_iter().filter_map(score).collect()
        } else {
            band.iter().filter_map(score).collect()
        };

        results.sort_unstable_by(compare_proximity);
        results.truncate(limit);

        debug!(
            center = %center,
            radius_km,
            scanned = band.len(),
            returned = results.len(),
            "radius query"
        );
        Ok(results)
    }

    /// Number of points in the current snapshot (0 before the first build)
    pub fn len(&self) -> usize {
        self.snapshot.load().map(|s| s.points.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_built(&self) -> bool {
        self.snapshot.is_loaded()
    }
}

impl Default for GeoIndex {
    fn default() -> Self {
        Self::new(GeoIndexConfig::default())
    }
}

fn compare_proximity(a: &ProximityResult, b: &ProximityResult) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then(a.poi.id.cmp(&b.poi.id))
}
