//! Point of interest export in OpenStreetMap element shape, one JSON object
//! per line.

use nearspot_core::{Error, Fee, GeoPoint, PoiAttributes, PointOfInterest, Result, Wheelchair};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// A degree value that some exports write as a JSON string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Degrees {
    Number(f64),
    Text(String),
}

impl Degrees {
    fn value(&self) -> std::result::Result<f64, String> {
        match self {
            Degrees::Number(x) => Ok(*x),
            Degrees::Text(s) => s.trim().parse().map_err(|_| format!("not a number: {s:?}")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Centroid {
    lat: Degrees,
    lon: Degrees,
}

#[derive(Debug, Deserialize)]
struct OsmElement {
    #[serde(rename = "type")]
    kind: String,
    lat: Option<Degrees>,
    lon: Option<Degrees>,
    centroid: Option<Centroid>,
    #[serde(default)]
    tags: HashMap<String, Value>,
}

impl OsmElement {
    fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).and_then(Value::as_str)
    }

    /// Elements without an access tag are public
    fn is_public(&self) -> bool {
        matches!(self.tag("access"), None | Some("yes") | Some("public"))
    }

    /// Nodes carry their own position; ways and relations use the centroid
    fn position(&self) -> std::result::Result<(f64, f64), String> {
        let (lat, lon) = if self.kind == "node" {
            match (&self.lat, &self.lon) {
                (Some(lat), Some(lon)) => (lat, lon),
                _ => return Err("node without lat/lon".into()),
            }
        } else {
            match &self.centroid {
                Some(c) => (&c.lat, &c.lon),
                None => return Err(format!("{} without centroid", self.kind)),
            }
        };
        Ok((lat.value()?, lon.value()?))
    }

    fn attributes(&self) -> PoiAttributes {
        PoiAttributes {
            fee: self.tag("fee").and_then(|v| v.parse::<Fee>().ok()),
            wheelchair: self.tag("wheelchair").and_then(|v| v.parse::<Wheelchair>().ok()),
        }
    }
}

/// Parse one export line into a point of interest with id `id`.
///
/// Returns `Ok(None)` when the element is not publicly accessible. Malformed
/// JSON, missing positions and out of range coordinates are reported as
/// `IngestionRecordCorrupt`. Byte order marks anywhere in the line are
/// ignored.
pub fn parse_poi_line(id: u64, line: &str) -> Result<Option<PointOfInterest>> {
    let corrupt = |reason: String| Error::IngestionRecordCorrupt { record: id, reason };

    let cleaned;
    let line = if line.contains('\u{feff}') {
        cleaned = line.replace('\u{feff}', "");
        cleaned.as_str()
    } else {
        line
    };

    let element: OsmElement =
        serde_json::from_str(line).map_err(|e| corrupt(format!("invalid json: {e}")))?;
    if !element.is_public() {
        return Ok(None);
    }

    let (lat, lon) = element.position().map_err(corrupt)?;
    let coordinate = GeoPoint::new(lat, lon).map_err(|e| corrupt(e.to_string()))?;

    Ok(Some(
        PointOfInterest::new(id, coordinate).with_attributes(element.attributes()),
    ))
}
