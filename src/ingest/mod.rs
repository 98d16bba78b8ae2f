//! Frame ingestion and decoding.
//!
//! This module provides:
//! - The frame decoder (`decode`): planar camera frames to packed images
//! - A synthetic `stub://` camera used by the daemon and tests
//! - A still-image source (feature: ingest-image)
//!
//! Sources produce `RawFrame` instances that are pushed into the pipeline's frame
//! slot. Sources MUST NOT block on the worker; the slot drops stale frames instead.

mod normalize;
#[cfg(feature = "ingest-image")]
pub mod still;
pub mod synthetic;

pub use normalize::decode;
pub(crate) use normalize::to_rgb;
#[cfg(feature = "ingest-image")]
pub use still::StillImageSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};
