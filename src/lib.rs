//! dempair: stereo and multilook candidate selection for satellite footprints
//!
//! Finds overlapping footprint pairs in a scene catalog, computes their
//! overlap and acquisition-geometry metrics, filters them into stereo and
//! multilook tiers, and clusters multilook-eligible pairs into groups for
//! DEM production.

pub mod types;
pub mod core;
pub mod io;

// Re-export main types and functions for easier access
pub use types::{BoundingBox, Footprint, OrbitDirection, PairError, PairResult, SceneAttributes};

pub use crate::core::{
    CandidateFilter, CandidatePair, CandidatePipeline, EngineConfig, FilterConfig, FootprintStore,
    GroupingParams, InventoryIndex, MultilookGroup, MultilookGrouper, PipelineCache, SpatialJoin,
    StoreSnapshot, TierClassifier,
};
