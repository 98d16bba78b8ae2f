//! Synthetic camera source.
//!
//! `SyntheticSource` stands in for the phone camera on `stub://` URLs. It emits
//! YUV 4:2:0 frames laid out the way mobile camera HALs deliver them (padded luma
//! rows, semi-planar chroma with pixel stride 2) so the decoder's stride handling
//! is exercised end to end.
//!
//! The scene is a dark background with one bright square that grows over an
//! approach cycle and then resets, which gives the detector, depth and trend
//! stages something to react to.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use rand::Rng;

use crate::frame::{FrameFormat, Plane, RawFrame, Rotation};

const BACKGROUND_LUMA: u8 = 40;
const OBJECT_LUMA: u8 = 230;
const ROW_ALIGN: usize = 64;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL; must start with `stub://`.
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate used to space capture instants.
    pub fps: u32,
    /// Frames per approach cycle.
    pub cycle_frames: u64,
    pub rotation: Rotation,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://front_camera".to_string(),
            width: 320,
            height: 240,
            fps: 15,
            cycle_frames: 90,
            rotation: Rotation::Deg0,
        }
    }
}

/// Statistics for a synthetic source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    started_at: Instant,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic source only serves stub:// urls, got {}",
                config.url
            ));
        }
        if config.width < 2 || config.height < 2 || config.fps == 0 || config.cycle_frames == 0 {
            return Err(anyhow!(
                "synthetic source needs width/height >= 2 and non-zero fps/cycle"
            ));
        }
        log::info!(
            "SyntheticSource: serving {} ({}x{} @ {} fps, rotated {} degrees)",
            config.url,
            config.width,
            config.height,
            config.fps,
            config.rotation.degrees()
        );
        Ok(Self {
            config,
            frame_count: 0,
            started_at: Instant::now(),
        })
    }

    /// Produce the next frame. Capture instants advance by exactly one frame
    /// interval per call, independent of wall-clock pacing.
    pub fn next_frame(&mut self) -> RawFrame {
        let index = self.frame_count;
        self.frame_count += 1;

        let captured_at = self.started_at + self.capture_offset(index);

        let w = self.config.width as usize;
        let h = self.config.height as usize;
        let (x0, y0, x1, y1) = self.object_rect(index);

        let y_stride = w.div_ceil(ROW_ALIGN) * ROW_ALIGN;
        let mut rng = rand::thread_rng();
        let mut luma = vec![0u8; y_stride * h];
        for row in 0..h {
            for col in 0..w {
                let base = if (x0..x1).contains(&col) && (y0..y1).contains(&row) {
                    OBJECT_LUMA
                } else {
                    BACKGROUND_LUMA
                };
                let noise: i16 = rng.gen_range(-4..=4);
                luma[row * y_stride + col] = (base as i16 + noise).clamp(0, 255) as u8;
            }
        }

        let chroma_w = w.div_ceil(2);
        let chroma_h = h.div_ceil(2);
        let chroma_stride = y_stride;
        let chroma_len = chroma_stride * (chroma_h - 1) + (chroma_w - 1) * 2 + 1;
        let u = vec![128u8; chroma_len];
        let v = vec![128u8; chroma_len];

        RawFrame::new(
            self.config.width,
            self.config.height,
            FrameFormat::Yuv420,
            vec![
                Plane::new(luma, y_stride, 1),
                Plane::new(u, chroma_stride, 2),
                Plane::new(v, chroma_stride, 2),
            ],
            self.config.rotation,
        )
        .with_captured_at(captured_at)
    }

    /// Object rectangle `(x0, y0, x1, y1)` in sensor pixels for a frame index.
    fn object_rect(&self, index: u64) -> (usize, usize, usize, usize) {
        let w = self.config.width as f32;
        let h = self.config.height as f32;
        let phase = (index % self.config.cycle_frames) as f32 / self.config.cycle_frames as f32;
        // Side grows from 10% to 70% of the shorter edge.
        let side = w.min(h) * (0.1 + 0.6 * phase);
        let cx = w * 0.5;
        let cy = h * 0.55;
        let x0 = (cx - side / 2.0).max(0.0) as usize;
        let y0 = (cy - side / 2.0).max(0.0) as usize;
        let x1 = ((cx + side / 2.0) as usize).min(self.config.width as usize);
        let y1 = ((cy + side / 2.0) as usize).min(self.config.height as usize);
        (x0, y0, x1, y1)
    }

    /// Time from the first frame to frame `index` at the nominal rate.
    fn capture_offset(&self, index: u64) -> Duration {
        let interval = Duration::from_secs(1) / self.config.fps;
        let nanos = interval.as_nanos().saturating_mul(u128::from(index));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
