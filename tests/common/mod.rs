#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use dempair::{Footprint, OrbitDirection, SceneAttributes};
use geo::{polygon, Polygon};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 10, 14, 21, 30, 0).unwrap()
}

pub fn rect(x0: f64, y0: f64, w: f64, h: f64) -> Polygon<f64> {
    polygon![
        (x: x0, y: y0),
        (x: x0 + w, y: y0),
        (x: x0 + w, y: y0 + h),
        (x: x0, y: y0 + h),
        (x: x0, y: y0),
    ]
}

/// Cloud-free, ground-controlled descending PS2 scene
pub fn scene(id: &str, geometry: Polygon<f64>, day_offset: i64, view_angle: f64) -> Footprint {
    Footprint::new(
        SceneAttributes {
            id: id.to_string(),
            acquired: base_time() + Duration::days(day_offset),
            instrument: "PS2".to_string(),
            view_angle,
            azimuth: 100.0,
            cloud_cover: 0.0,
            orbit_direction: OrbitDirection::Descending,
            ground_control: true,
            strip_id: None,
        },
        geometry,
    )
}

/// Seed `a` overlapping `b` and `c`, which are disjoint from each other.
///
/// Near the equator, each overlap ratio is inside (0.3, 0.7), angle
/// differences are 8 degrees and acquisitions are 3 and 6 days apart.
pub fn star_scenes() -> Vec<Footprint> {
    vec![
        scene("a", rect(0.0, 0.0, 0.30, 0.1), 0, 0.0),
        scene("b", rect(-0.15, 0.0, 0.30, 0.1), 3, 8.0),
        scene("c", rect(0.16, 0.0, 0.30, 0.1), 6, -8.0),
    ]
}

/// Deterministic scatter of `n` scenes over a small region
pub fn scattered_scenes(n: usize) -> Vec<Footprint> {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state >> 11) as f64 / (1u64 << 53) as f64
    };

    (0..n)
        .map(|i| {
            let x0 = -147.0 + next() * 2.0;
            let y0 = 64.0 + next() * 1.0;
            let w = 0.05 + next() * 0.3;
            let h = 0.05 + next() * 0.15;
            let mut fp = scene(&format!("scene_{:03}", i), rect(x0, y0, w, h), (i % 20) as i64, next() * 20.0 - 10.0);
            fp.attributes.cloud_cover = next() * 0.3;
            fp.attributes.ground_control = i % 7 != 0;
            fp
        })
        .collect()
}
