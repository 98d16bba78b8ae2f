use crate::PerceptionError;

/// Value used for every cell of a degenerate (flat) depth map.
pub const FLAT_DEPTH: f32 = 0.5;

/// Square depth map normalized per call to [0, 1], higher = closer.
#[derive(Clone, Debug)]
pub struct DepthMap {
    edge: usize,
    values: Vec<f32>,
}

impl DepthMap {
    /// Min-max normalize a raw `edge x edge` model output.
    ///
    /// Raw values follow the model's convention (larger = closer) and keep it.
    /// A flat map, or one without finite values, becomes `FLAT_DEPTH` everywhere.
    /// Non-finite cells in an otherwise valid map also become `FLAT_DEPTH`.
    pub fn normalize(raw: Vec<f32>, edge: usize) -> Result<Self, PerceptionError> {
        let expected = edge.checked_mul(edge).unwrap_or(0);
        if expected == 0 || raw.len() != expected {
            return Err(PerceptionError::InferenceFailure(format!(
                "depth map of {} values does not match a {}x{} grid",
                raw.len(),
                edge,
                edge
            )));
        }

        let (min, max) = raw
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });

        let range = max - min;
        let values = if !range.is_finite() || range <= 0.0 {
            vec![FLAT_DEPTH; expected]
        } else {
            raw.into_iter()
                .map(|v| {
                    if v.is_finite() {
                        ((v - min) / range).clamp(0.0, 1.0)
                    } else {
                        FLAT_DEPTH
                    }
                })
                .collect()
        };

        Ok(Self { edge, values })
    }

    pub fn edge(&self) -> usize {
        self.edge
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Sample at a normalized point; coordinates are clamped into the map.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let col = self.index(x);
        let row = self.index(y);
        self.values[row * self.edge + col]
    }

    fn index(&self, coord: f32) -> usize {
        let coord = if coord.is_finite() { coord } else { 0.5 };
        let scaled = (coord * self.edge as f32).floor();
        (scaled.max(0.0) as usize).min(self.edge - 1)
    }
}
