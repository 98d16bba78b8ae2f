use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::PackedImage;

/// Stub backend for testing and the synthetic camera.
///
/// Reports the bounding box of all pixels brighter than a luma threshold as a
/// single obstacle. Good enough to follow the synthetic scene's bright square.
pub struct StubDetector {
    label: String,
    luma_threshold: u8,
    /// Minimum fraction of sampled pixels that must be bright.
    min_coverage: f32,
    step: u32,
}

impl StubDetector {
    pub fn new() -> Self {
        Self {
            label: "obstacle".to_string(),
            luma_threshold: 180,
            min_coverage: 0.002,
            step: 2,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

}

impl Default for StubDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, image: &PackedImage) -> Result<Vec<Detection>> {
        let (w, h) = (image.width(), image.height());
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        let mut bright = 0u64;
        let mut sampled = 0u64;

        for y in (0..h).step_by(self.step as usize) {
            for x in (0..w).step_by(self.step as usize) {
                sampled += 1;
                if image.luma(x, y).map_or(true, |luma| luma < self.luma_threshold) {
                    continue;
                }
                bright += 1;
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }

        let Some((x0, y0, x1, y1)) = bounds else {
            return Ok(Vec::new());
        };
        let coverage = bright as f32 / sampled.max(1) as f32;
        if coverage < self.min_coverage {
            return Ok(Vec::new());
        }

        let right = (x1 + self.step).min(w);
        let bottom = (y1 + self.step).min(h);
        Ok(vec![Detection {
            label: self.label.clone(),
            confidence: (0.5 + coverage).min(0.95),
            bbox: BoundingBox::new(x0 as f32, y0 as f32, right as f32, bottom as f32),
        }])
    }
}
