//! SEE perception kernel
//!
//! Turns a live camera feed into obstacle warnings for blind users: haptic pulses
//! for what is close, short spoken summaries for what is around.
//!
//! # Architecture
//!
//! One frame flows through the loop in order:
//!
//! 1. **Decode**: planar camera frames become packed images (`ingest::decode`).
//! 2. **Detect**: a detector backend finds labeled boxes (`detect`).
//! 3. **Depth**: a throttled depth backend samples the primary obstacle (`depth`).
//! 4. **Trend**: per-label depth history classifies approach speed (`trend`).
//! 5. **Actuate**: proximity plus approach boost picks a haptic tier (`haptic`).
//! 6. **Summarize**: obstacles, trend, text and labels fuse into one gated
//!    summary for the voice sink (`context`).
//!
//! `session::PerceptionSession` owns all cross-frame state and runs the steps;
//! `pipeline` feeds it from a capacity-1 drop-oldest frame slot on a worker thread.
//!
//! Transient failures (busy or failing backends, malformed frames) never raise an
//! alarm: they produce fewer obstacles, a cached depth, or a skipped frame.

use std::fmt;

pub mod config;
pub mod context;
pub mod depth;
pub mod detect;
pub mod frame;
pub mod haptic;
pub mod ingest;
pub mod pipeline;
pub mod session;
pub mod sink;
pub mod trend;

pub use config::SeeConfig;
pub use context::{AuxSignals, ContextAggregator, ContextSummary, Priority, SceneLabel};
pub use depth::{DepthEstimationEngine, DepthOutcome, DepthSample, SkipReason};
pub use detect::{DetectedObstacle, DetectorBackend, ObjectDetectionAdapter, Position};
pub use frame::{FrameFormat, PackedImage, PixelLayout, Plane, RawFrame, Rotation};
pub use haptic::{HapticCommand, HapticPolicy, HapticTier};
pub use pipeline::{FrameSender, FrameSlot, Pipeline, PipelineHandle, PipelineStats};
pub use session::{FrameReport, PerceptionSession, SessionStats};
pub use sink::{ActuatorSink, LogActuator, LogVoice, RecordingSink, VoiceSink};
pub use trend::{DepthChangeResult, DistanceCategory, Trend, TrendTracker};

/// Per-frame failure taxonomy.
///
/// Neither variant is fatal: the session skips the frame or falls back to the
/// cached result and keeps running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PerceptionError {
    /// Plane count, stride or buffer length does not match the declared format.
    UnsupportedFormat(String),
    /// Preprocessing, model execution or output shape failed.
    InferenceFailure(String),
}

impl fmt::Display for PerceptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerceptionError::UnsupportedFormat(msg) => write!(f, "unsupported frame format: {}", msg),
            PerceptionError::InferenceFailure(msg) => write!(f, "inference failure: {}", msg),
        }
    }
}

impl std::error::Error for PerceptionError {}
