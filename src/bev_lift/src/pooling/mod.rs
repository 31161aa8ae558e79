//! Voxel pooling: plan construction, interval detection, execution and the
//! static-geometry plan cache.

pub mod cache;
pub mod executor;
pub mod plan;
pub mod segments;

pub use cache::PlanCache;
pub use executor::{voxel_pooling, BevFeature};
pub use plan::{prepare_plan, PlanOutcome, PoolingPlan};
pub use segments::{detect_intervals, Intervals};
