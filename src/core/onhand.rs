use crate::core::multilook::MultilookGroup;
use crate::core::pair_metrics::CandidatePair;
use crate::types::{PairError, PairResult};
use std::collections::{BTreeMap, BTreeSet};

/// Scenes per order request accepted by the imagery provider
pub const DEFAULT_ORDER_BATCH_SIZE: usize = 500;

/// Length of the extension stripped from inventory filenames (".tif")
const FILENAME_SUFFIX_LEN: usize = 4;

/// Local inventory of scenes already on hand: scene id -> filename
#[derive(Debug, Clone, Default)]
pub struct InventoryIndex {
    filenames: BTreeMap<String, String>,
}

impl InventoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index filenames whose stem is the scene id.
    ///
    /// Each filename must be `<scene id>` plus a 4-character extension
    /// such as `.tif`; the stem is taken verbatim. Product names that carry
    /// extra suffixes (`<id>_3B_AnalyticMS.tif`) would be keyed by the whole
    /// stem and never match a scene, so collect `(id, filename)` pairs
    /// into the index instead.
    pub fn from_filenames<I, S>(filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = Self::new();
        for filename in filenames {
            let filename = filename.into();
            let id = filename_stem(&filename).to_string();
            index.insert(id, filename);
        }
        index
    }

    pub fn insert(&mut self, id: impl Into<String>, filename: impl Into<String>) -> Option<String> {
        self.filenames.insert(id.into(), filename.into())
    }

    pub fn filename(&self, id: &str) -> Option<&str> {
        self.filenames.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.filenames.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InventoryIndex {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut index = Self::new();
        for (id, filename) in iter {
            index.insert(id, filename);
        }
        index
    }
}

/// Filename minus its fixed 4-character extension; empty for shorter names
pub fn filename_stem(filename: &str) -> &str {
    match filename.char_indices().rev().nth(FILENAME_SUFFIX_LEN - 1) {
        Some((idx, _)) => &filename[..idx],
        None => "",
    }
}

/// Candidate pair whose scenes are both in the local inventory
#[derive(Debug, Clone, PartialEq)]
pub struct OnhandCandidatePair {
    pub pair: CandidatePair,
    pub filename1: String,
    pub filename2: String,
    /// stem(filename1) + "-" + stem(filename2)
    pub pairname_fn: String,
}

impl OnhandCandidatePair {
    fn resolve(pair: &CandidatePair, inventory: &InventoryIndex) -> Option<Self> {
        let filename1 = inventory.filename(&pair.id1)?;
        let filename2 = inventory.filename(&pair.id2)?;
        Some(Self {
            pairname_fn: format!("{}-{}", filename_stem(filename1), filename_stem(filename2)),
            filename1: filename1.to_string(),
            filename2: filename2.to_string(),
            pair: pair.clone(),
        })
    }
}

/// Keep only pairs with both scenes on hand
pub fn resolve_onhand(pairs: &[CandidatePair], inventory: &InventoryIndex) -> Vec<OnhandCandidatePair> {
    let resolved: Vec<OnhandCandidatePair> = pairs
        .iter()
        .filter_map(|pair| OnhandCandidatePair::resolve(pair, inventory))
        .collect();
    log::debug!(
        "Onhand pairs: {} of {} ({} dropped)",
        resolved.len(),
        pairs.len(),
        pairs.len() - resolved.len()
    );
    resolved
}

/// Sorted unique scene ids referenced by the pairs
pub fn scene_ids(pairs: &[CandidatePair]) -> Vec<String> {
    let ids: BTreeSet<&str> = pairs
        .iter()
        .flat_map(|pair| [pair.id1.as_str(), pair.id2.as_str()])
        .collect();
    ids.into_iter().map(str::to_string).collect()
}

/// Scene ids referenced by the pairs that are not on hand yet
pub fn ids_to_order(pairs: &[CandidatePair], inventory: &InventoryIndex) -> Vec<String> {
    let all = scene_ids(pairs);
    let total = all.len();
    let missing: Vec<String> = all.into_iter().filter(|id| !inventory.contains(id)).collect();
    log::info!(
        "Scenes referenced: {}, already onhand: {}, to order: {}",
        total,
        total - missing.len(),
        missing.len()
    );
    missing
}

/// Split ids into order-sized batches
pub fn order_batches(ids: &[String], batch_size: usize) -> PairResult<Vec<Vec<String>>> {
    if batch_size == 0 {
        return Err(PairError::config("order batch size must be positive"));
    }
    Ok(ids.chunks(batch_size).map(<[String]>::to_vec).collect())
}

/// Filename pairname of a group when every member is on hand
pub fn resolve_group(group: &MultilookGroup, inventory: &InventoryIndex) -> Option<String> {
    let stems = group
        .members
        .iter()
        .map(|id| inventory.filename(id).map(filename_stem))
        .collect::<Option<Vec<&str>>>()?;
    Some(stems.join("-"))
}
