use crate::PerceptionError;

/// Resize packed RGB24 to `edge x edge` (nearest neighbour) and lay it out
/// channel-first as float32 in [0, 1], channel order R, G, B.
///
/// Source coordinates are `round(x * w / edge)`, clamped to the image.
pub fn rgb_to_chw(rgb: &[u8], width: usize, height: usize, edge: usize) -> Result<Vec<f32>, PerceptionError> {
    if width == 0 || height == 0 || edge == 0 {
        return Err(PerceptionError::UnsupportedFormat(format!(
            "cannot resize {}x{} to {}",
            width, height, edge
        )));
    }
    let expected = width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| PerceptionError::UnsupportedFormat("RGB dimensions overflow".to_string()))?;
    if rgb.len() != expected {
        return Err(PerceptionError::UnsupportedFormat(format!(
            "expected {} RGB bytes, received {}",
            expected,
            rgb.len()
        )));
    }

    let src_x: Vec<usize> = (0..edge).map(|x| nearest(x, width, edge)).collect();
    let src_y: Vec<usize> = (0..edge).map(|y| nearest(y, height, edge)).collect();

    let plane = edge * edge;
    let mut data = vec![0f32; 3 * plane];
    for (y, &sy) in src_y.iter().enumerate() {
        for (x, &sx) in src_x.iter().enumerate() {
            let src = (sy * width + sx) * 3;
            let dst = y * edge + x;
            data[dst] = rgb[src] as f32 / 255.0;
            data[plane + dst] = rgb[src + 1] as f32 / 255.0;
            data[2 * plane + dst] = rgb[src + 2] as f32 / 255.0;
        }
    }
    Ok(data)
}

fn nearest(dst: usize, src_len: usize, edge: usize) -> usize {
    let scaled = (dst as f64 * src_len as f64 / edge as f64).round() as usize;
    scaled.min(src_len - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_channel_first_and_scaled() {
        // 1x1 image, pure red-ish.
        let data = rgb_to_chw(&[255, 0, 51], 1, 1, 2).unwrap();
        assert_eq!(data.len(), 3 * 4);
        assert!(data[..4].iter().all(|&v| v == 1.0));
        assert!(data[4..8].iter().all(|&v| v == 0.0));
        assert!(data[8..].iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn upscale_picks_nearest_source() {
        // 2x1 image: left black, right white; resized to 4x4.
        let rgb = [0, 0, 0, 255, 255, 255];
        let data = rgb_to_chw(&rgb, 2, 1, 4).unwrap();
        let red_row: Vec<f32> = data[..4].to_vec();
        // round(x * 2 / 4) = 0, 1 (0.5 rounds away from zero), 1, 2 -> clamped 1.
        assert_eq!(red_row, vec![0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(rgb_to_chw(&[0; 5], 1, 2, 4).is_err());
    }
}
