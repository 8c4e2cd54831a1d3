use crate::core::geometry::{self, AreaModel};
use crate::types::{BoundingBox, Footprint, PairError, PairResult};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Footprint store keyed by scene id
///
/// Owns footprint geometry and attributes. Records are replaced by id on
/// re-ingestion and retired by removal; every change bumps the revision.
#[derive(Debug, Default)]
pub struct FootprintStore {
    records: BTreeMap<String, Footprint>,
    revision: u64,
}

impl FootprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from freshly ingested records.
    ///
    /// Every record is validated; a repeated id is a data integrity error
    /// rather than an implicit replacement.
    pub fn from_records<I>(records: I) -> PairResult<Self>
    where
        I: IntoIterator<Item = Footprint>,
    {
        let mut store = Self::new();
        for footprint in records {
            footprint.validate()?;
            let id = footprint.id().to_string();
            if store.records.contains_key(&id) {
                return Err(PairError::integrity(id, "duplicate footprint id"));
            }
            store.records.insert(id, footprint);
        }
        store.revision = 1;
        log::debug!("Footprint store built with {} records", store.records.len());
        Ok(store)
    }

    /// Insert or replace a footprint by id, returning the replaced record
    pub fn upsert(&mut self, footprint: Footprint) -> PairResult<Option<Footprint>> {
        footprint.validate()?;
        self.revision += 1;
        Ok(self.records.insert(footprint.id().to_string(), footprint))
    }

    pub fn remove(&mut self, id: &str) -> Option<Footprint> {
        let removed = self.records.remove(id);
        if removed.is_some() {
            self.revision += 1;
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&Footprint> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Footprints in id order
    pub fn iter(&self) -> impl Iterator<Item = &Footprint> {
        self.records.values()
    }

    /// Footprints whose bounding box intersects `bbox`
    pub fn intersecting_bbox(&self, bbox: &BoundingBox) -> Vec<&Footprint> {
        bbox_query(self.records.values(), bbox)
    }

    /// Footprints matching an attribute predicate
    pub fn select<P>(&self, predicate: P) -> Vec<&Footprint>
    where
        P: Fn(&Footprint) -> bool,
    {
        self.records.values().filter(|fp| predicate(fp)).collect()
    }

    /// Freeze the current contents into an immutable snapshot
    pub fn snapshot(&self) -> StoreSnapshot {
        let footprints: Vec<Footprint> = self.records.values().cloned().collect();
        StoreSnapshot::from_sorted(footprints, self.revision)
    }
}

/// Immutable, versioned view of the footprint store
///
/// Records are sorted by id. Clones share the underlying records.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    footprints: Arc<[Footprint]>,
    fingerprint: String,
    revision: u64,
}

impl StoreSnapshot {
    /// Snapshot over records that did not come through a store.
    ///
    /// Validates every record and fails on duplicate ids.
    pub fn from_footprints(mut footprints: Vec<Footprint>) -> PairResult<Self> {
        for footprint in &footprints {
            footprint.validate()?;
        }
        footprints.sort_by(|a, b| a.id().cmp(b.id()));
        if let Some(dup) = footprints.windows(2).find(|w| w[0].id() == w[1].id()) {
            return Err(PairError::integrity(dup[0].id(), "duplicate footprint id"));
        }
        Ok(Self::from_sorted(footprints, 0))
    }

    fn from_sorted(footprints: Vec<Footprint>, revision: u64) -> Self {
        let fingerprint = content_fingerprint(&footprints);
        Self {
            footprints: footprints.into(),
            fingerprint,
            revision,
        }
    }

    pub fn footprints(&self) -> &[Footprint] {
        &self.footprints
    }

    pub fn get(&self, id: &str) -> Option<&Footprint> {
        self.footprints
            .binary_search_by(|fp| fp.id().cmp(id))
            .ok()
            .map(|idx| &self.footprints[idx])
    }

    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }

    /// SHA-256 over every record field; equal contents give equal fingerprints
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn intersecting_bbox(&self, bbox: &BoundingBox) -> Vec<&Footprint> {
        bbox_query(self.footprints.iter(), bbox)
    }

    pub fn select<P>(&self, predicate: P) -> Vec<&Footprint>
    where
        P: Fn(&Footprint) -> bool,
    {
        self.footprints.iter().filter(|fp| predicate(fp)).collect()
    }

    /// Area of the union of every footprint in the snapshot
    pub fn coverage_area(&self, model: AreaModel) -> f64 {
        let geometries: Vec<_> = self
            .footprints
            .iter()
            .map(|fp| geometry::to_multi(&fp.geometry))
            .collect();
        model.area(&geometry::union_all(&geometries))
    }
}

fn bbox_query<'a, I>(footprints: I, bbox: &BoundingBox) -> Vec<&'a Footprint>
where
    I: Iterator<Item = &'a Footprint>,
{
    footprints
        .filter(|fp| fp.bounding_box().map_or(false, |b| b.intersects(bbox)))
        .collect()
}

fn content_fingerprint(footprints: &[Footprint]) -> String {
    let mut hasher = Sha256::new();
    for fp in footprints {
        let attrs = &fp.attributes;
        hasher.update(attrs.id.as_bytes());
        hasher.update(b"|");
        hasher.update(attrs.acquired.to_rfc3339().as_bytes());
        hasher.update(b"|");
        hasher.update(attrs.instrument.as_bytes());
        hasher.update(b"|");
        hasher.update(attrs.view_angle.to_bits().to_le_bytes());
        hasher.update(attrs.azimuth.to_bits().to_le_bytes());
        hasher.update(attrs.cloud_cover.to_bits().to_le_bytes());
        hasher.update(attrs.orbit_direction.to_string().as_bytes());
        hasher.update([attrs.ground_control as u8]);
        match &attrs.strip_id {
            Some(strip) => {
                hasher.update([1u8]);
                hasher.update(strip.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update(b"|");
        for ring in std::iter::once(fp.geometry.exterior()).chain(fp.geometry.interiors()) {
            for c in ring.coords() {
                hasher.update(c.x.to_bits().to_le_bytes());
                hasher.update(c.y.to_bits().to_le_bytes());
            }
            hasher.update(b";");
        }
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
