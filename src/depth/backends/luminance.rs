use anyhow::{anyhow, Result};

use crate::depth::backend::DepthBackend;

/// Stub depth backend: brighter neighbourhoods are closer.
///
/// Raw depth is the box-blurred luminance of the input tensor. The blur makes a
/// growing bright object read as steadily closer at its centre until it fills the
/// blur window, which is what the synthetic camera needs.
pub struct LuminanceDepth {
    /// Blur radius as a fraction of the input edge.
    radius_fraction: f32,
}

impl LuminanceDepth {
    pub fn new() -> Self {
        Self {
            radius_fraction: 1.0 / 6.0,
        }
    }

    pub fn with_radius_fraction(mut self, radius_fraction: f32) -> Self {
        self.radius_fraction = radius_fraction.clamp(0.0, 1.0);
        self
    }
}

impl Default for LuminanceDepth {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthBackend for LuminanceDepth {
    fn name(&self) -> &'static str {
        "luminance"
    }

    fn infer(&mut self, input: &[f32], edge: usize) -> Result<Vec<f32>> {
        let plane = edge * edge;
        if plane == 0 || input.len() != 3 * plane {
            return Err(anyhow!(
                "expected {} input values for edge {}, got {}",
                3 * plane,
                edge,
                input.len()
            ));
        }

        let luma: Vec<f32> = (0..plane)
            .map(|i| 0.299 * input[i] + 0.587 * input[plane + i] + 0.114 * input[2 * plane + i])
            .collect();

        let radius = (edge as f32 * self.radius_fraction) as usize;
        if radius == 0 {
            return Ok(luma);
        }
        Ok(box_blur(&luma, edge, radius))
    }
}

/// Mean over a `(2r+1)^2` window (clipped at the borders), via an integral image.
fn box_blur(values: &[f32], edge: usize, radius: usize) -> Vec<f32> {
    let stride = edge + 1;
    let mut integral = vec![0f64; stride * stride];
    for y in 0..edge {
        let mut row_sum = 0f64;
        for x in 0..edge {
            row_sum += values[y * edge + x] as f64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let mut out = vec![0f32; edge * edge];
    for y in 0..edge {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(edge);
        for x in 0..edge {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(edge);
            let sum = integral[y1 * stride + x1] - integral[y0 * stride + x1]
                - integral[y1 * stride + x0]
                + integral[y0 * stride + x0];
            let count = ((y1 - y0) * (x1 - x0)) as f64;
            out[y * edge + x] = (sum / count) as f32;
        }
    }
    out
}
