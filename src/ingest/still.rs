//! Still-image frame source.
//!
//! Replays one decoded photo (JPEG/PNG) as a stream of RGB frames. This is the
//! still-capture path the detector falls back to when the live stream keeps
//! coming back empty.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::frame::{FrameFormat, Plane, RawFrame, Rotation};

pub struct StillImageSource {
    path: PathBuf,
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    frame_count: u64,
}

impl StillImageSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?
            .to_rgb8();
        let (width, height) = decoded.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("image {} is empty", path.display()));
        }
        log::info!(
            "StillImageSource: loaded {} ({}x{})",
            path.display(),
            width,
            height
        );
        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            rgb: decoded.into_raw(),
            frame_count: 0,
        })
    }

    pub fn next_frame(&mut self) -> RawFrame {
        self.frame_count += 1;
        RawFrame::new(
            self.width,
            self.height,
            FrameFormat::Rgb24,
            vec![Plane::packed(self.rgb.clone(), self.width as usize, 3)],
            Rotation::Deg0,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_served(&self) -> u64 {
        self.frame_count
    }
}
