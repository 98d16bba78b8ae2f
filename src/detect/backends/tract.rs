#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::depth::preprocess::rgb_to_chw;
use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::PackedImage;

const FALLBACK_LABEL: &str = "object";

/// Tract-based object detector.
///
/// Expects a post-processed ONNX model: input `[1, 3, S, S]` RGB in [0, 1],
/// output rows of `[x1, y1, x2, y2, score, class]` in model-input pixels
/// (shape `[1, N, 6]` or `[N, 6]`). Class indices map into `labels`.
pub struct TractDetector {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: usize,
    labels: Vec<String>,
}

impl TractDetector {
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32, labels: Vec<String>) -> Result<Self> {
        let model_path = model_path.as_ref();
        let input_size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX detector from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, input_size, input_size)),
            )
            .context("failed to set detector input fact")?
            .into_optimized()
            .context("failed to optimize ONNX detector")?
            .into_runnable()
            .context("failed to build runnable ONNX detector")?;

        log::info!(
            "TractDetector: loaded {} ({} labels, input {})",
            model_path.display(),
            labels.len(),
            input_size
        );
        Ok(Self {
            model,
            input_size,
            labels,
        })
    }

    /// Load labels from a text file, one per line.
    pub fn read_labels<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels {}", path.display()))?;
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn build_input(&self, image: &PackedImage) -> Result<Tensor> {
        let rgb = image.to_rgb();
        let chw = rgb_to_chw(
            &rgb,
            image.width() as usize,
            image.height() as usize,
            self.input_size,
        )?;
        let input = tract_ndarray::Array4::from_shape_vec(
            (1, 3, self.input_size, self.input_size),
            chw,
        )
        .context("detector input shape mismatch")?;
        Ok(input.into_tensor())
    }

    fn parse_rows(&self, outputs: TVec<TValue>, image: &PackedImage) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("detector produced no outputs"))?;
        let rows = output
            .to_array_view::<f32>()
            .context("detector output tensor was not f32")?;
        let values: Vec<f32> = rows.iter().copied().collect();
        if values.len() % 6 != 0 {
            return Err(anyhow!(
                "detector output of {} values is not a list of 6-wide rows",
                values.len()
            ));
        }

        let sx = image.width() as f32 / self.input_size as f32;
        let sy = image.height() as f32 / self.input_size as f32;
        Ok(values
            .chunks_exact(6)
            .map(|row| {
                let class = row[5];
                let label = Some(class)
                    .filter(|c| c.is_finite() && *c >= 0.0)
                    .and_then(|c| self.labels.get(c as usize))
                    .map(String::as_str)
                    .unwrap_or(FALLBACK_LABEL);
                Detection {
                    label: label.to_string(),
                    confidence: row[4],
                    bbox: BoundingBox::new(row[0] * sx, row[1] * sy, row[2] * sx, row[3] * sy),
                }
            })
            .collect())
    }
}

impl DetectorBackend for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &PackedImage) -> Result<Vec<Detection>> {
        let input = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX detector inference failed")?;
        self.parse_rows(outputs, image)
    }
}
