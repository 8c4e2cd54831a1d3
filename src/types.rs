use chrono::{DateTime, Utc};
use geo::{BoundingRect, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::core::geometry;

/// Orbit pass direction of the acquiring platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrbitDirection {
    Ascending,
    Descending,
}

impl std::fmt::Display for OrbitDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrbitDirection::Ascending => write!(f, "ascending"),
            OrbitDirection::Descending => write!(f, "descending"),
        }
    }
}

/// Acquisition metadata of a single scene (everything but its geometry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneAttributes {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub instrument: String,              // PS2, PS2.SD, PSB.SD, ...
    pub view_angle: f64,                 // signed off-nadir, degrees
    pub azimuth: f64,                    // degrees
    pub cloud_cover: f64,                // fraction [0, 1]
    pub orbit_direction: OrbitDirection,
    pub ground_control: bool,
    pub strip_id: Option<String>,
}

/// Scene footprint: ground coverage polygon (EPSG:4326 lon/lat) plus metadata
///
/// Footprints are never mutated once ingested; corrections go through
/// re-ingestion into the store, which replaces the record by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    pub attributes: SceneAttributes,
    pub geometry: Polygon<f64>,
}

impl Footprint {
    pub fn new(attributes: SceneAttributes, geometry: Polygon<f64>) -> Self {
        Self { attributes, geometry }
    }

    pub fn id(&self) -> &str {
        &self.attributes.id
    }

    /// Check the record against the ingestion invariants.
    ///
    /// Rejects empty ids, degenerate or non-finite geometry, and non-finite or
    /// out-of-range attribute values. The error carries the footprint id.
    pub fn validate(&self) -> PairResult<()> {
        let attrs = &self.attributes;
        if attrs.id.trim().is_empty() {
            return Err(PairError::integrity("<empty>", "footprint id is empty"));
        }
        if !attrs.view_angle.is_finite() {
            return Err(PairError::integrity(&attrs.id, "view angle is not finite"));
        }
        if !attrs.azimuth.is_finite() {
            return Err(PairError::integrity(&attrs.id, "azimuth is not finite"));
        }
        if !attrs.cloud_cover.is_finite() || !(0.0..=1.0).contains(&attrs.cloud_cover) {
            return Err(PairError::integrity(
                &attrs.id,
                format!("cloud cover {} outside [0, 1]", attrs.cloud_cover),
            ));
        }
        geometry::validate_polygon(&self.geometry)
            .map_err(|reason| PairError::integrity(&attrs.id, reason))
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.geometry.bounding_rect().map(BoundingBox::from)
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon: min_lon.min(max_lon),
            max_lon: min_lon.max(max_lon),
            min_lat: min_lat.min(max_lat),
            max_lat: min_lat.max(max_lat),
        }
    }

    /// Closed-interval overlap test; touching boxes intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    pub fn upper_left(&self) -> (f64, f64) {
        (self.min_lon, self.max_lat)
    }

    pub fn lower_right(&self) -> (f64, f64) {
        (self.max_lon, self.min_lat)
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

/// Error types for pair and group selection
#[derive(Debug, thiserror::Error)]
pub enum PairError {
    #[error("Data integrity violation for footprint '{id}': {reason}")]
    DataIntegrity { id: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Union area of pair {id1}-{id2} is zero")]
    ZeroUnionArea { id1: String, id2: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PairError {
    pub fn integrity(id: impl Into<String>, reason: impl Into<String>) -> Self {
        PairError::DataIntegrity {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        PairError::Configuration(message.into())
    }
}

/// Result type for pair selection operations
pub type PairResult<T> = Result<T, PairError>;
