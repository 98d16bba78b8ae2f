//! Camera frame containers.
//!
//! - `RawFrame`: planar frame as delivered by the capture source. Borrowed by one
//!   processing call and dropped afterwards.
//! - `PackedImage`: tightly packed image produced by the frame decoder and consumed
//!   by the inference adapters.
//! - `Rotation`: clockwise rotation needed to bring sensor pixels upright.

use std::time::Instant;

use crate::PerceptionError;

// ----------------------------------------------------------------------------
// RawFrame: planar capture container
// ----------------------------------------------------------------------------

/// Pixel format tag carried by a raw frame.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    /// Three planes (Y, U, V) with 2x2 chroma subsampling.
    Yuv420,
    /// Single plane, 3 bytes per pixel.
    Rgb24,
    /// Single plane, 4 bytes per pixel (B, G, R, A).
    Bgra8888,
    /// Single plane, 1 byte per pixel.
    Gray8,
}

impl FrameFormat {
    /// Number of planes a frame of this format must carry.
    pub fn plane_count(self) -> usize {
        match self {
            FrameFormat::Yuv420 => 3,
            FrameFormat::Rgb24 | FrameFormat::Bgra8888 | FrameFormat::Gray8 => 1,
        }
    }
}

/// One plane of a raw frame.
#[derive(Clone, Debug)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Bytes between the starts of two consecutive rows.
    pub row_stride: usize,
    /// Bytes between two horizontally adjacent samples.
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Tightly packed plane: row stride equals `width * pixel_stride`.
    pub fn packed(data: Vec<u8>, width: usize, pixel_stride: usize) -> Self {
        Self::new(data, width * pixel_stride, pixel_stride)
    }

    /// Sample at `(x, y)` using this plane's own strides. `None` when out of bounds.
    pub(crate) fn sample(&self, x: usize, y: usize) -> Option<u8> {
        let index = y
            .checked_mul(self.row_stride)?
            .checked_add(x.checked_mul(self.pixel_stride)?)?;
        self.data.get(index).copied()
    }
}

/// Clockwise rotation that brings the sensor image upright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u32) -> Result<Self, PerceptionError> {
        match degrees % 360 {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(PerceptionError::UnsupportedFormat(format!(
                "rotation {} is not a multiple of 90",
                other
            ))),
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Upright dimensions for a sensor image of `width x height`.
    pub fn upright_dims(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Rotation::Deg0 | Rotation::Deg180 => (width, height),
            Rotation::Deg90 | Rotation::Deg270 => (height, width),
        }
    }

    /// Map a normalized sensor point into the upright frame.
    pub fn to_upright(self, x: f32, y: f32) -> (f32, f32) {
        match self {
            Rotation::Deg0 => (x, y),
            Rotation::Deg90 => (1.0 - y, x),
            Rotation::Deg180 => (1.0 - x, 1.0 - y),
            Rotation::Deg270 => (y, 1.0 - x),
        }
    }

    /// Map a normalized upright point back into sensor coordinates.
    pub fn to_sensor(self, x: f32, y: f32) -> (f32, f32) {
        match self {
            Rotation::Deg0 => (x, y),
            Rotation::Deg90 => (y, 1.0 - x),
            Rotation::Deg180 => (1.0 - x, 1.0 - y),
            Rotation::Deg270 => (1.0 - y, x),
        }
    }
}

/// Raw planar frame pushed by the capture source.
///
/// The pipeline moves a `RawFrame` into the worker, decodes it once and drops it.
/// Nothing downstream keeps a reference to the planes.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub planes: Vec<Plane>,
    pub rotation: Rotation,
    pub captured_at: Instant,
}

impl RawFrame {
    pub fn new(
        width: u32,
        height: u32,
        format: FrameFormat,
        planes: Vec<Plane>,
        rotation: Rotation,
    ) -> Self {
        Self {
            width,
            height,
            format,
            planes,
            rotation,
            captured_at: Instant::now(),
        }
    }

    /// Override the capture instant (replayed or synthetic sources).
    pub fn with_captured_at(mut self, captured_at: Instant) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Total bytes held by the planes.
    pub fn byte_len(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }
}

// ----------------------------------------------------------------------------
// PackedImage: decoder output
// ----------------------------------------------------------------------------

/// Memory layout of a packed image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    /// Full-resolution Y followed by interleaved V/U at quarter resolution.
    Nv21,
    Rgb24,
    Bgra8888,
    Gray8,
}

impl PixelLayout {
    /// Exact byte length of a packed image with this layout.
    pub fn byte_len(self, width: usize, height: usize) -> Option<usize> {
        let pixels = width.checked_mul(height)?;
        match self {
            PixelLayout::Nv21 => {
                let chroma = width.div_ceil(2).checked_mul(height.div_ceil(2))?;
                pixels.checked_add(chroma.checked_mul(2)?)
            }
            PixelLayout::Rgb24 => pixels.checked_mul(3),
            PixelLayout::Bgra8888 => pixels.checked_mul(4),
            PixelLayout::Gray8 => Some(pixels),
        }
    }
}

/// Tightly packed image in sensor orientation.
#[derive(Clone, Debug)]
pub struct PackedImage {
    width: u32,
    height: u32,
    layout: PixelLayout,
    data: Vec<u8>,
}

impl PackedImage {
    /// Wrap packed bytes, validating the length against the layout.
    pub fn new(
        width: u32,
        height: u32,
        layout: PixelLayout,
        data: Vec<u8>,
    ) -> Result<Self, PerceptionError> {
        let expected = layout
            .byte_len(width as usize, height as usize)
            .ok_or_else(|| {
                PerceptionError::UnsupportedFormat("image dimensions overflow".to_string())
            })?;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(PerceptionError::UnsupportedFormat(format!(
                "{:?} image {}x{} expects {} bytes, got {}",
                layout,
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Luma of the pixel at `(x, y)`, whatever the layout. `None` outside the image.
    pub fn luma(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.width as usize + x as usize;
        match self.layout {
            PixelLayout::Nv21 | PixelLayout::Gray8 => self.data.get(idx).copied(),
            PixelLayout::Rgb24 => {
                let p = self.data.get(idx * 3..idx * 3 + 3)?;
                Some(rgb_luma(p[0], p[1], p[2]))
            }
            PixelLayout::Bgra8888 => {
                let p = self.data.get(idx * 4..idx * 4 + 3)?;
                Some(rgb_luma(p[2], p[1], p[0]))
            }
        }
    }

    /// Convert to packed RGB24.
    pub fn to_rgb(&self) -> Vec<u8> {
        crate::ingest::to_rgb(self)
    }
}

fn rgb_luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
