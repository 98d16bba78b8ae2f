use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::PackedImage;

/// Object detector backend.
///
/// Backends receive the packed image in sensor orientation and return boxes in
/// sensor pixel coordinates. Rotation into the upright frame, position bucketing
/// and relative sizing happen in `ObjectDetectionAdapter`, so every backend gets
/// the same semantics.
///
/// Implementations must treat the pixel slice as read-only and ephemeral: no
/// copies beyond the `detect` call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one image.
    fn detect(&mut self, image: &PackedImage) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once before the loop starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
