use crate::frame::{FrameFormat, PackedImage, PixelLayout, Plane, RawFrame};
use crate::PerceptionError;

/// Decode a raw camera frame into a packed image.
///
/// Three-plane YUV 4:2:0 becomes NV21 (Y, then interleaved V/U). Single-plane
/// formats are copied row by row. Every plane is indexed with its own row and
/// pixel stride; any missing plane or out-of-range read yields `UnsupportedFormat`.
pub fn decode(frame: &RawFrame) -> Result<PackedImage, PerceptionError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(unsupported(format!(
            "empty frame {}x{}",
            frame.width, frame.height
        )));
    }
    let expected_planes = frame.format.plane_count();
    if frame.planes.len() < expected_planes {
        return Err(unsupported(format!(
            "{:?} frame needs {} planes, got {}",
            frame.format,
            expected_planes,
            frame.planes.len()
        )));
    }

    match frame.format {
        FrameFormat::Yuv420 => yuv420_to_nv21(frame),
        FrameFormat::Rgb24 => copy_single_plane(frame, PixelLayout::Rgb24, 3),
        FrameFormat::Bgra8888 => copy_single_plane(frame, PixelLayout::Bgra8888, 4),
        FrameFormat::Gray8 => copy_single_plane(frame, PixelLayout::Gray8, 1),
    }
}

fn yuv420_to_nv21(frame: &RawFrame) -> Result<PackedImage, PerceptionError> {
    let w = frame.width as usize;
    let h = frame.height as usize;
    let (y_plane, u_plane, v_plane) = (&frame.planes[0], &frame.planes[1], &frame.planes[2]);
    let len = PixelLayout::Nv21
        .byte_len(w, h)
        .ok_or_else(|| unsupported("NV21 frame dimensions overflow".to_string()))?;

    let mut nv21 = Vec::with_capacity(len);
    for row in 0..h {
        copy_row(y_plane, row, w, 1, &mut nv21).ok_or_else(|| {
            unsupported(format!("luma row {} exceeds plane of {} bytes", row, y_plane.data.len()))
        })?;
    }

    let chroma_w = w.div_ceil(2);
    let chroma_h = h.div_ceil(2);
    for row in 0..chroma_h {
        for col in 0..chroma_w {
            let v = v_plane.sample(col, row);
            let u = u_plane.sample(col, row);
            match (v, u) {
                (Some(v), Some(u)) => {
                    nv21.push(v);
                    nv21.push(u);
                }
                _ => {
                    return Err(unsupported(format!(
                        "chroma sample ({}, {}) out of bounds",
                        col, row
                    )))
                }
            }
        }
    }

    PackedImage::new(frame.width, frame.height, PixelLayout::Nv21, nv21)
}

fn copy_single_plane(
    frame: &RawFrame,
    layout: PixelLayout,
    bytes_per_pixel: usize,
) -> Result<PackedImage, PerceptionError> {
    let w = frame.width as usize;
    let h = frame.height as usize;
    let plane = &frame.planes[0];
    if plane.pixel_stride < bytes_per_pixel {
        return Err(unsupported(format!(
            "{:?} pixel stride {} is smaller than {} bytes per pixel",
            layout, plane.pixel_stride, bytes_per_pixel
        )));
    }
    let len = layout
        .byte_len(w, h)
        .ok_or_else(|| unsupported(format!("{:?} frame dimensions overflow", layout)))?;

    let mut packed = Vec::with_capacity(len);
    for row in 0..h {
        copy_row(plane, row, w, bytes_per_pixel, &mut packed).ok_or_else(|| {
            unsupported(format!(
                "{:?} row {} exceeds plane of {} bytes",
                layout,
                row,
                plane.data.len()
            ))
        })?;
    }

    PackedImage::new(frame.width, frame.height, layout, packed)
}

/// Append `width` pixels of `row`, `bytes_per_pixel` bytes each.
fn copy_row(
    plane: &Plane,
    row: usize,
    width: usize,
    bytes_per_pixel: usize,
    out: &mut Vec<u8>,
) -> Option<()> {
    let start = row.checked_mul(plane.row_stride)?;
    if plane.pixel_stride == bytes_per_pixel {
        let end = start.checked_add(width.checked_mul(bytes_per_pixel)?)?;
        out.extend_from_slice(plane.data.get(start..end)?);
        return Some(());
    }
    for col in 0..width {
        let offset = start.checked_add(col.checked_mul(plane.pixel_stride)?)?;
        let end = offset.checked_add(bytes_per_pixel)?;
        out.extend_from_slice(plane.data.get(offset..end)?);
    }
    Some(())
}

/// Convert any packed layout to RGB24.
pub(crate) fn to_rgb(image: &PackedImage) -> Vec<u8> {
    let pixels = image.as_bytes();
    match image.layout() {
        PixelLayout::Rgb24 => pixels.to_vec(),
        PixelLayout::Bgra8888 => pixels
            .chunks_exact(4)
            .flat_map(|p| [p[2], p[1], p[0]])
            .collect(),
        PixelLayout::Gray8 => pixels.iter().flat_map(|&g| [g, g, g]).collect(),
        PixelLayout::Nv21 => nv21_to_rgb(pixels, image.width() as usize, image.height() as usize),
    }
}

fn nv21_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let y_plane = w * h;
    let chroma_w = w.div_ceil(2);
    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let vu_index = y_plane + ((j / 2) * chroma_w + i / 2) * 2;
            let v = pixels[vu_index] as f32 - 128.0;
            let u = pixels[vu_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }
    rgb
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn unsupported(message: String) -> PerceptionError {
    PerceptionError::UnsupportedFormat(message)
}
