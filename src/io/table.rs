//! Per-member multilook metadata table
//!
//! One row per group: `src_id`, `pair_count`, `upper_left`, `lower_right`,
//! then `filename{j}`, `view_angle{j}`, `azimuth{j}` for each member `j`
//! (1-based, seed first). Rows of smaller groups are padded with empty cells.

use crate::core::multilook::MultilookGroup;
use crate::core::onhand::{filename_stem, InventoryIndex};
use crate::core::store::StoreSnapshot;
use crate::io::export::multipolygon_bbox;
use crate::types::{PairError, PairResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const PER_MEMBER_FIELDS: [&str; 3] = ["filename", "view_angle", "azimuth"];

fn header(max_members: usize) -> Vec<String> {
    let mut header: Vec<String> = ["src_id", "pair_count", "upper_left", "lower_right"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for j in 1..=max_members {
        header.extend(PER_MEMBER_FIELDS.iter().map(|field| format!("{}{}", field, j)));
    }
    header
}

fn format_corner((x, y): (f64, f64)) -> String {
    format!("({}, {})", x, y)
}

fn row(
    group: &MultilookGroup,
    snapshot: &StoreSnapshot,
    inventory: Option<&InventoryIndex>,
    max_members: usize,
) -> PairResult<Vec<String>> {
    let (upper_left, lower_right) = match multipolygon_bbox(&group.footprint) {
        Some(bbox) => (format_corner(bbox.upper_left()), format_corner(bbox.lower_right())),
        None => (String::new(), String::new()),
    };

    let mut record = vec![
        group.seed.clone(),
        group.pair_count().to_string(),
        upper_left,
        lower_right,
    ];
    for id in &group.members {
        let footprint = snapshot
            .get(id)
            .ok_or_else(|| PairError::integrity(id.as_str(), "group member missing from the snapshot"))?;
        // Inventory stem when on hand, scene id otherwise
        let filename = inventory
            .and_then(|inv| inv.filename(id))
            .map_or(id.as_str(), filename_stem);
        record.push(filename.to_string());
        record.push(footprint.attributes.view_angle.to_string());
        record.push(footprint.attributes.azimuth.to_string());
    }
    record.resize(4 + PER_MEMBER_FIELDS.len() * max_members, String::new());
    Ok(record)
}

/// Write the multilook metadata table as CSV
pub fn write_multilook_table_to<W: Write>(
    writer: W,
    groups: &[MultilookGroup],
    snapshot: &StoreSnapshot,
    inventory: Option<&InventoryIndex>,
) -> PairResult<()> {
    let max_members = groups.iter().map(MultilookGroup::member_count).max().unwrap_or(0);
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(header(max_members))?;
    for group in groups {
        csv_writer.write_record(row(group, snapshot, inventory, max_members)?)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_multilook_table<P: AsRef<Path>>(
    path: P,
    groups: &[MultilookGroup],
    snapshot: &StoreSnapshot,
    inventory: Option<&InventoryIndex>,
) -> PairResult<()> {
    let path = path.as_ref();
    write_multilook_table_to(BufWriter::new(File::create(path)?), groups, snapshot, inventory)?;
    log::info!("Wrote multilook table with {} groups to {}", groups.len(), path.display());
    Ok(())
}
