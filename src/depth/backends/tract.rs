#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::depth::backend::DepthBackend;

/// Tract-based monocular depth backend (Depth Anything V2 / MiDaS exports).
///
/// The model must take `[1, 3, E, E]` and return `E * E` values, either as
/// `[1, E, E]` or `[1, 1, E, E]`.
pub struct TractDepth {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    edge: usize,
}

impl TractDepth {
    pub fn new<P: AsRef<Path>>(model_path: P, edge: usize) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX depth model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, edge, edge)),
            )
            .context("failed to set depth input fact")?
            .into_optimized()
            .context("failed to optimize ONNX depth model")?
            .into_runnable()
            .context("failed to build runnable ONNX depth model")?;

        log::info!(
            "TractDepth: loaded {} ({}x{})",
            model_path.display(),
            edge,
            edge
        );
        Ok(Self { model, edge })
    }
}

impl DepthBackend for TractDepth {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, input: &[f32], edge: usize) -> Result<Vec<f32>> {
        if edge != self.edge {
            return Err(anyhow!(
                "engine edge {} does not match model edge {}",
                edge,
                self.edge
            ));
        }
        let tensor = tract_ndarray::Array4::from_shape_vec((1, 3, edge, edge), input.to_vec())
            .context("depth input shape mismatch")?
            .into_tensor();
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX depth inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("depth model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("depth output tensor was not f32")?;
        Ok(view.iter().copied().collect())
    }
}
