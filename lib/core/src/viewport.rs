//! Map viewport fitting.
//!
//! Given a set of points, pick a web map zoom level and center that frame all
//! of them. The result is a pure function of the input, so the same points
//! always produce the same viewport.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use crate::geo::GeoPoint;
use crate::{Error, Result};

/// Aspect ratio used when the caller does not supply one
pub const DEFAULT_WIDTH_TO_HEIGHT: f64 = 2.0;

/// Padding applied around the bounding box
const MARGIN: f64 = 1.2;

/// Longitudinal span in degrees covered at zoom 20, 19, ..., 1 (at the equator)
const ZOOM_SPANS: [f64; 20] = [
    0.0007, 0.0014, 0.003, 0.006, 0.012, 0.024, 0.048, 0.096, 0.192, 0.3712, 0.768, 1.536,
    3.072, 6.144, 11.8784, 23.7568, 47.5136, 98.304, 190.0544, 360.0,
];

const MAX_ZOOM: f64 = 20.0;
const MIN_ZOOM: f64 = 1.0;

/// Map projections the fitter knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    Mercator,
}

impl FromStr for Projection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mercator" => Ok(Projection::Mercator),
            _ => Err(Error::UnsupportedProjection(s.to_string())),
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projection::Mercator => write!(f, "mercator"),
        }
    }
}

/// Zoom level and center for a map display
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    /// Between 1 (whole world) and 20 (street level), two decimals
    pub zoom: f64,
    pub center: GeoPoint,
}

/// Fit a Mercator viewport around `points`.
///
/// `width_to_height` is the aspect ratio of the map widget. A single point,
/// or any set with a zero-area bounding box, gets zoom 20. Boxes crossing the
/// antimeridian are not unwrapped and come out wider than they are.
pub fn fit_viewport(points: &[GeoPoint], width_to_height: f64) -> Result<Viewport> {
    fit_viewport_in(points, width_to_height, Projection::Mercator)
}

/// Like [`fit_viewport`], with the projection given by name
pub fn fit_viewport_with(points: &[GeoPoint], width_to_height: f64, projection: &str) -> Result<Viewport> {
    fit_viewport_in(points, width_to_height, projection.parse()?)
}

fn fit_viewport_in(points: &[GeoPoint], width_to_height: f64, projection: Projection) -> Result<Viewport> {
    if !width_to_height.is_finite() || width_to_height <= 0.0 {
        return Err(Error::InvalidConfig(format!(
            "width_to_height must be a positive number, got {width_to_height}"
        )));
    }
    let first = points.first().ok_or(Error::EmptyPointSet)?;

    let (mut min_lat, mut max_lat) = (first.lat(), first.lat());
    let (mut min_lon, mut max_lon) = (first.lon(), first.lon());
    for p in &points[1..] {
        min_lat = min_lat.min(p.lat());
        max_lat = max_lat.max(p.lat());
        min_lon = min_lon.min(p.lon());
        max_lon = max_lon.max(p.lon());
    }

    let center = GeoPoint::new(
        round_to((max_lat + min_lat) / 2.0, 6),
        round_to((max_lon + min_lon) / 2.0, 6),
    )?;

    let zoom = match projection {
        Projection::Mercator => {
            let height = (max_lat - min_lat) * MARGIN * width_to_height;
            let width = (max_lon - min_lon) * MARGIN;
            let lon_zoom = span_to_zoom(width);
            let lat_zoom = span_to_zoom(height);
            round_to(lon_zoom.min(lat_zoom), 2)
        }
    };

    Ok(Viewport { zoom, center })
}

/// Piecewise-linear lookup of `span` in [`ZOOM_SPANS`], clamped at both ends
fn span_to_zoom(span: f64) -> f64 {
    if span <= ZOOM_SPANS[0] {
        return MAX_ZOOM;
    }
    if span >= ZOOM_SPANS[ZOOM_SPANS.len() - 1] {
        return MIN_ZOOM;
    }
    // First entry strictly greater than span; 1 <= upper < len here
    let upper = ZOOM_SPANS.partition_point(|&s| s <= span);
    let (x0, x1) = (ZOOM_SPANS[upper - 1], ZOOM_SPANS[upper]);
    let z0 = MAX_ZOOM - (upper - 1) as f64;
    z0 - (span - x0) / (x1 - x0)
}

/// Round to `decimals` places on the exact binary value.
///
/// Scaling by a power of ten first can flip the last digit, which the
/// formatter avoids.
fn round_to(x: f64, decimals: usize) -> f64 {
    format!("{x:.decimals$}").parse().unwrap_or(x)
}
