use serde::{Deserialize, Serialize};
use std::str::FromStr;
use crate::geo::GeoPoint;
use crate::vector::Vector;

/// Whether using the facility costs money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fee {
    Yes,
    No,
}

impl FromStr for Fee {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Fee::Yes),
            "no" => Ok(Fee::No),
            _ => Err(()),
        }
    }
}

/// Wheelchair accessibility, using the OpenStreetMap vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wheelchair {
    Yes,
    No,
    Limited,
    Designated,
}

impl FromStr for Wheelchair {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Wheelchair::Yes),
            "no" => Ok(Wheelchair::No),
            "limited" => Ok(Wheelchair::Limited),
            "designated" => Ok(Wheelchair::Designated),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoiAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<Fee>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wheelchair: Option<Wheelchair>,
}

impl PoiAttributes {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fee.is_none() && self.wheelchair.is_none()
    }
}

/// A point of interest served by the [`GeoIndex`](crate::GeoIndex).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub id: u64,
    pub coordinate: GeoPoint,
    #[serde(default)]
    pub attributes: PoiAttributes,
}

impl PointOfInterest {
    #[inline]
    #[must_use]
    pub fn new(id: u64, coordinate: GeoPoint) -> Self {
        Self {
            id,
            coordinate,
            attributes: PoiAttributes::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_attributes(mut self, attributes: PoiAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// An address with its text embedding, served by the
/// [`VectorIndex`](crate::VectorIndex).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: u64,
    pub label: String,
    pub coordinate: GeoPoint,
    pub embedding: Vector,
}

impl AddressRecord {
    #[inline]
    #[must_use]
    pub fn new(id: u64, label: impl Into<String>, coordinate: GeoPoint, embedding: Vector) -> Self {
        Self {
            id,
            label: label.into(),
            coordinate,
            embedding,
        }
    }
}
