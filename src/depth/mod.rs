//! Monocular depth estimation.
//!
//! - `preprocess`: nearest-neighbour resize to a square CHW float tensor
//! - `DepthMap`: per-call min-max normalization (higher = closer) and sampling
//! - `DepthEstimationEngine`: throttled, single-flight, cached estimator
//! - Backends: `LuminanceDepth` stub, `TractDepth` (feature: backend-tract)

mod backend;
mod backends;
mod engine;
mod map;
pub mod preprocess;

pub use backend::DepthBackend;
pub use backends::LuminanceDepth;
#[cfg(feature = "backend-tract")]
pub use backends::TractDepth;
pub use engine::{
    DepthEngineConfig, DepthEstimationEngine, DepthOutcome, DepthSample, DepthStats, SkipReason,
    DEFAULT_INPUT_EDGE, DEFAULT_MIN_INTERVAL, DEFAULT_PATCH_SIZE,
};
pub use map::{DepthMap, FLAT_DEPTH};
