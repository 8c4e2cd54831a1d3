//! Core pair and group selection modules

pub mod geometry;
pub mod store;
pub mod spatial_join;
pub mod pair_metrics;
pub mod filter;
pub mod onhand;
pub mod multilook;
pub mod selection;
pub mod pipeline;

// Re-export main types
pub use geometry::{AreaModel, ZERO_AREA_EPSILON};
pub use store::{FootprintStore, StoreSnapshot};
pub use spatial_join::{AdmitAll, FootprintIndex, GroundControlRequired, IntersectingPair, JoinOptions, PairPredicate, SpatialJoin};
pub use pair_metrics::{compute_candidates, compute_pair, CandidatePair};
pub use filter::{CandidateFilter, Criterion, FilterConfig, Tier, TierClassifier, TierSet};
pub use onhand::{ids_to_order, order_batches, resolve_group, resolve_onhand, scene_ids, InventoryIndex, OnhandCandidatePair, DEFAULT_ORDER_BATCH_SIZE};
pub use multilook::{Completion, GroupingBudget, GroupingOutcome, GroupingParams, GroupingStrategy, MultilookGroup, MultilookGrouper, PartialReason};
pub use selection::{DistinctMembership, GreedyLargestArea, GroupSelectionPolicy, KeepAll, SelectionPolicy};
pub use pipeline::{CandidatePipeline, EngineConfig, PipelineCache, PipelineOutput};
