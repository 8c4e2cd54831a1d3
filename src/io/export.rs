use crate::core::multilook::MultilookGroup;
use crate::core::pair_metrics::CandidatePair;
use crate::types::{BoundingBox, PairResult};
use geo::{BoundingRect, MultiPolygon, Polygon};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Flat CSV row for one candidate pair
#[derive(Debug, Serialize)]
struct PairRecord<'a> {
    pairname: String,
    id1: &'a str,
    id2: &'a str,
    acquired1: String,
    acquired2: String,
    instrument1: &'a str,
    instrument2: &'a str,
    view_angle1: f64,
    view_angle2: f64,
    azimuth1: f64,
    azimuth2: f64,
    cloud_cover1: f64,
    cloud_cover2: f64,
    overlap_ratio: f64,
    intersection_area: f64,
    date_diff_days: i64,
    angle_diff: f64,
    azimuth_diff: f64,
    min_lon: Option<f64>,
    min_lat: Option<f64>,
    max_lon: Option<f64>,
    max_lat: Option<f64>,
}

impl<'a> PairRecord<'a> {
    fn from_pair(pair: &'a CandidatePair) -> Self {
        let bbox = multipolygon_bbox(&pair.intersection);
        Self {
            pairname: pair.pairname(),
            id1: &pair.id1,
            id2: &pair.id2,
            acquired1: pair.scene1.acquired.to_rfc3339(),
            acquired2: pair.scene2.acquired.to_rfc3339(),
            instrument1: &pair.scene1.instrument,
            instrument2: &pair.scene2.instrument,
            view_angle1: pair.scene1.view_angle,
            view_angle2: pair.scene2.view_angle,
            azimuth1: pair.scene1.azimuth,
            azimuth2: pair.scene2.azimuth,
            cloud_cover1: pair.scene1.cloud_cover,
            cloud_cover2: pair.scene2.cloud_cover,
            overlap_ratio: pair.overlap_ratio,
            intersection_area: pair.intersection_area,
            date_diff_days: pair.date_diff_days,
            angle_diff: pair.angle_diff,
            azimuth_diff: pair.azimuth_diff,
            min_lon: bbox.map(|b| b.min_lon),
            min_lat: bbox.map(|b| b.min_lat),
            max_lon: bbox.map(|b| b.max_lon),
            max_lat: bbox.map(|b| b.max_lat),
        }
    }
}

pub(crate) fn multipolygon_bbox(geometry: &MultiPolygon<f64>) -> Option<BoundingBox> {
    geometry.bounding_rect().map(BoundingBox::from)
}

/// Write candidate pairs as CSV with a header row
pub fn write_pairs_csv_to<W: Write>(writer: W, pairs: &[CandidatePair]) -> PairResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for pair in pairs {
        csv_writer.serialize(PairRecord::from_pair(pair))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_pairs_csv<P: AsRef<Path>>(path: P, pairs: &[CandidatePair]) -> PairResult<()> {
    let path = path.as_ref();
    write_pairs_csv_to(BufWriter::new(File::create(path)?), pairs)?;
    log::info!("Wrote {} pairs to {}", pairs.len(), path.display());
    Ok(())
}

fn ring_coordinates(ring: &geo::LineString<f64>) -> Vec<[f64; 2]> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}

fn polygon_coordinates(polygon: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_coordinates)
        .collect()
}

/// GeoJSON geometry object for a multipolygon
pub fn multipolygon_geometry(geometry: &MultiPolygon<f64>) -> Value {
    let polygons: Vec<_> = geometry.0.iter().map(polygon_coordinates).collect();
    json!({
        "type": "MultiPolygon",
        "coordinates": polygons,
    })
}

fn feature_collection(features: Vec<Value>) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// FeatureCollection of pair intersections with their metrics as properties
pub fn pairs_geojson(pairs: &[CandidatePair]) -> Value {
    let features = pairs
        .iter()
        .map(|pair| {
            json!({
                "type": "Feature",
                "geometry": multipolygon_geometry(&pair.intersection),
                "properties": {
                    "pairname": pair.pairname(),
                    "id1": pair.id1,
                    "id2": pair.id2,
                    "acquired1": pair.scene1.acquired.to_rfc3339(),
                    "acquired2": pair.scene2.acquired.to_rfc3339(),
                    "overlap_ratio": pair.overlap_ratio,
                    "intersection_area": pair.intersection_area,
                    "date_diff_days": pair.date_diff_days,
                    "angle_diff": pair.angle_diff,
                    "azimuth_diff": pair.azimuth_diff,
                },
            })
        })
        .collect();
    feature_collection(features)
}

/// FeatureCollection of group footprints
pub fn groups_geojson(groups: &[MultilookGroup]) -> Value {
    let features = groups
        .iter()
        .map(|group| {
            json!({
                "type": "Feature",
                "geometry": multipolygon_geometry(&group.footprint),
                "properties": {
                    "src_id": group.seed,
                    "pairname": group.pairname(),
                    "pair_count": group.pair_count(),
                    "members": group.members,
                    "covered_area": group.covered_area,
                },
            })
        })
        .collect();
    feature_collection(features)
}

fn write_json(path: &Path, value: &Value) -> PairResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

pub fn write_pairs_geojson<P: AsRef<Path>>(path: P, pairs: &[CandidatePair]) -> PairResult<()> {
    let path = path.as_ref();
    write_json(path, &pairs_geojson(pairs))?;
    log::info!("Wrote {} pair features to {}", pairs.len(), path.display());
    Ok(())
}

pub fn write_groups_geojson<P: AsRef<Path>>(path: P, groups: &[MultilookGroup]) -> PairResult<()> {
    let path = path.as_ref();
    write_json(path, &groups_geojson(groups))?;
    log::info!("Wrote {} group features to {}", groups.len(), path.display());
    Ok(())
}

/// One id per line
pub fn write_id_list<P, S>(path: P, ids: &[S]) -> PairResult<()>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    for id in ids {
        writeln!(writer, "{}", id.as_ref())?;
    }
    writer.flush()?;
    log::info!("Wrote {} ids to {}", ids.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn test_multipolygon_geometry_rings() {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        let value = multipolygon_geometry(&MultiPolygon::new(vec![square]));
        assert_eq!(value["type"], "MultiPolygon");
        let rings = value["coordinates"][0].as_array().unwrap();
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].as_array().unwrap().len(), 5);
        assert_eq!(value["coordinates"][0][0][2], json!([1.0, 1.0]));
    }

    #[test]
    fn test_empty_collections() {
        let value = pairs_geojson(&[]);
        assert_eq!(value["type"], "FeatureCollection");
        assert!(value["features"].as_array().unwrap().is_empty());
    }
}
