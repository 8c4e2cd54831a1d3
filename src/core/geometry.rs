use geo::line_intersection::line_intersection;
use geo::{Area, BooleanOps, Coord, Intersects, Line, LineString, MapCoords, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

/// Areas at or below this value (CRS units squared) are treated as zero
pub const ZERO_AREA_EPSILON: f64 = 1e-12;

/// WGS84 semi-major axis used as the sphere radius for Eckert IV (meters)
const SPHERE_RADIUS: f64 = 6_378_137.0;

// Eckert IV constants: 2 / sqrt(pi * (4 + pi)), 2 * sqrt(pi / (4 + pi)), 2 + pi / 2
const ECK4_CX: f64 = 0.422_238_200_315_771_2;
const ECK4_CY: f64 = 1.326_500_428_177_002_3;
const ECK4_CP: f64 = 3.570_796_326_794_896_6;
const ECK4_MAX_ITER: usize = 50;
const ECK4_TOLERANCE: f64 = 1e-12;

/// How footprint areas are measured for area thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AreaModel {
    /// Planar area in the units of the input CRS (degrees squared for EPSG:4326)
    Planar,
    /// Square meters after projecting lon/lat onto the Eckert IV equal-area plane
    #[default]
    EqualArea,
}

impl AreaModel {
    pub fn area(&self, geometry: &MultiPolygon<f64>) -> f64 {
        match self {
            AreaModel::Planar => geometry.unsigned_area(),
            AreaModel::EqualArea => geometry.map_coords(eckert_iv).unsigned_area(),
        }
    }

    pub fn polygon_area(&self, geometry: &Polygon<f64>) -> f64 {
        match self {
            AreaModel::Planar => geometry.unsigned_area(),
            AreaModel::EqualArea => geometry.map_coords(eckert_iv).unsigned_area(),
        }
    }
}

/// Forward Eckert IV projection of a lon/lat coordinate (degrees) to meters.
///
/// Solves `theta + sin(theta)cos(theta) + 2 sin(theta) = (2 + pi/2) sin(phi)`
/// by Newton iteration.
pub fn eckert_iv(coord: Coord<f64>) -> Coord<f64> {
    let half_pi = std::f64::consts::FRAC_PI_2;
    let lambda = coord.x.to_radians();
    let phi = coord.y.clamp(-90.0, 90.0).to_radians();
    let target = ECK4_CP * phi.sin();

    let mut theta = phi / 2.0;
    for _ in 0..ECK4_MAX_ITER {
        let (sin_t, cos_t) = theta.sin_cos();
        let derivative = 2.0 * cos_t * (1.0 + cos_t);
        if derivative.abs() < f64::EPSILON {
            break;
        }
        let delta = (theta + sin_t * cos_t + 2.0 * sin_t - target) / derivative;
        theta = (theta - delta).clamp(-half_pi, half_pi);
        if delta.abs() < ECK4_TOLERANCE {
            break;
        }
    }

    let (sin_t, cos_t) = theta.sin_cos();
    Coord {
        x: ECK4_CX * SPHERE_RADIUS * lambda * (1.0 + cos_t),
        y: ECK4_CY * SPHERE_RADIUS * sin_t,
    }
}

/// Check that a polygon is usable as a footprint.
///
/// Returns the violated invariant as a message; callers attach the id.
pub fn validate_polygon(polygon: &Polygon<f64>) -> Result<(), String> {
    let all_finite = polygon
        .exterior()
        .coords()
        .chain(polygon.interiors().iter().flat_map(|ring| ring.coords()))
        .all(|c| c.x.is_finite() && c.y.is_finite());
    if !all_finite {
        return Err("geometry has non-finite coordinates".to_string());
    }

    let mut distinct: Vec<Coord<f64>> = Vec::new();
    for c in polygon.exterior().coords() {
        if !distinct.contains(c) {
            distinct.push(*c);
        }
    }
    if distinct.len() < 3 {
        return Err(format!(
            "geometry exterior has {} distinct vertices, need at least 3",
            distinct.len()
        ));
    }

    let area = polygon.unsigned_area();
    if !area.is_finite() || area <= 0.0 {
        return Err("geometry has zero area".to_string());
    }

    for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
        if let Some((i, j)) = ring_self_intersection(ring) {
            return Err(format!("geometry ring self-intersects between segments {} and {}", i, j));
        }
    }

    Ok(())
}

/// First pair of non-adjacent segments that touch or cross.
///
/// Zero-length segments from repeated vertices are skipped so they do not
/// break adjacency.
fn ring_self_intersection(ring: &LineString<f64>) -> Option<(usize, usize)> {
    let segments: Vec<Line<f64>> = ring.lines().filter(|l| l.start != l.end).collect();
    let n = segments.len();
    for i in 0..n {
        for j in (i + 2)..n {
            // first and last segments share the closing vertex
            if i == 0 && j == n - 1 {
                continue;
            }
            if line_intersection(segments[i], segments[j]).is_some() {
                return Some((i, j));
            }
        }
    }
    None
}

pub fn to_multi(polygon: &Polygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon.clone()])
}

pub fn intersection(a: &Polygon<f64>, b: &Polygon<f64>) -> MultiPolygon<f64> {
    a.intersection(b)
}

pub fn intersect_multi(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    a.intersection(b)
}

/// Union of all geometries, folded left to right
pub fn union_all<'a, I>(geometries: I) -> MultiPolygon<f64>
where
    I: IntoIterator<Item = &'a MultiPolygon<f64>>,
{
    geometries
        .into_iter()
        .fold(MultiPolygon::new(Vec::new()), |acc, next| {
            if acc.0.is_empty() {
                next.clone()
            } else {
                acc.union(next)
            }
        })
}

/// Clip a polygon to an area of interest; `None` when they do not overlap
pub fn clip_to_aoi(polygon: &Polygon<f64>, aoi: &Polygon<f64>) -> Option<MultiPolygon<f64>> {
    if !polygon.intersects(aoi) {
        return None;
    }
    let clipped = polygon.intersection(aoi);
    if clipped.unsigned_area() <= ZERO_AREA_EPSILON {
        None
    } else {
        Some(clipped)
    }
}
