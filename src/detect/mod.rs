mod adapter;
mod backend;
mod backends;
mod result;

pub use adapter::{DetectionStats, ObjectDetectionAdapter};
pub use backend::DetectorBackend;
pub use backends::StubDetector;
#[cfg(feature = "backend-tract")]
pub use backends::TractDetector;
pub use result::{BoundingBox, DetectedObstacle, Detection, Position};
