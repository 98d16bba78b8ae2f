use anyhow::Result;

/// Monocular depth backend.
///
/// The engine hands over a `[1, 3, edge, edge]` channel-first RGB tensor in
/// [0, 1] and expects `edge * edge` raw depth values back, larger meaning closer.
/// Normalization, sampling, throttling and caching are the engine's job.
pub trait DepthBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// One forward pass.
    fn infer(&mut self, input: &[f32], edge: usize) -> Result<Vec<f32>>;
}
