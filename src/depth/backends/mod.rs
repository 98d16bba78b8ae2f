pub mod luminance;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use luminance::LuminanceDepth;

#[cfg(feature = "backend-tract")]
pub use tract::TractDepth;
