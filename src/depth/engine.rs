use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, TryLockError};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::depth::backend::DepthBackend;
use crate::depth::map::DepthMap;
use crate::depth::preprocess::rgb_to_chw;
use crate::frame::PackedImage;
use crate::PerceptionError;

/// Default square input edge: 18 patches of 14 pixels.
pub const DEFAULT_INPUT_EDGE: usize = 252;
pub const DEFAULT_PATCH_SIZE: usize = 14;
/// At most three inferences per second.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(333);

/// One normalized depth reading (1.0 = closest).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthSample {
    pub depth: f32,
    pub timestamp: Instant,
}

/// Why the engine did not run a fresh inference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Called sooner than the minimum interval.
    Throttled,
    /// Another inference is in flight.
    Busy,
    /// Preprocessing, the backend or the output failed.
    InferenceFailure,
}

/// Result of one `estimate` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DepthOutcome {
    Fresh(DepthSample),
    /// The previously cached sample, returned instead of a fresh one.
    Stale {
        sample: DepthSample,
        reason: SkipReason,
    },
    /// Nothing fresh and nothing cached.
    Unavailable(SkipReason),
}

impl DepthOutcome {
    pub fn sample(&self) -> Option<DepthSample> {
        match self {
            DepthOutcome::Fresh(sample) | DepthOutcome::Stale { sample, .. } => Some(*sample),
            DepthOutcome::Unavailable(_) => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, DepthOutcome::Fresh(_))
    }
}

#[derive(Clone, Debug)]
pub struct DepthEngineConfig {
    pub input_edge: usize,
    pub patch_size: usize,
    pub min_interval: Duration,
}

impl Default for DepthEngineConfig {
    fn default() -> Self {
        Self {
            input_edge: DEFAULT_INPUT_EDGE,
            patch_size: DEFAULT_PATCH_SIZE,
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DepthStats {
    pub inferences: u64,
    pub throttled: u64,
    pub busy: u64,
    pub failures: u64,
}

#[derive(Default)]
struct DepthCache {
    last_attempt: Option<Instant>,
    sample: Option<DepthSample>,
}

/// Throttled, single-flight depth estimator with a one-sample cache.
pub struct DepthEstimationEngine {
    backend: Mutex<Box<dyn DepthBackend>>,
    backend_name: &'static str,
    config: DepthEngineConfig,
    cache: Mutex<DepthCache>,
    inferences: AtomicU64,
    throttled: AtomicU64,
    busy: AtomicU64,
    failures: AtomicU64,
}

impl DepthEstimationEngine {
    /// Build an engine. An input edge that is not a whole number of patches is a
    /// startup error.
    pub fn new<B: DepthBackend + 'static>(backend: B, config: DepthEngineConfig) -> Result<Self> {
        Self::from_boxed(Box::new(backend), config)
    }

    pub fn from_boxed(backend: Box<dyn DepthBackend>, config: DepthEngineConfig) -> Result<Self> {
        if config.patch_size == 0 || config.input_edge == 0 {
            return Err(anyhow!("depth input edge and patch size must be non-zero"));
        }
        if config.input_edge % config.patch_size != 0 {
            return Err(anyhow!(
                "depth input edge {} is not a multiple of patch size {}",
                config.input_edge,
                config.patch_size
            ));
        }
        let backend_name = backend.name();
        log::info!(
            "depth engine: backend={} edge={} min_interval={}ms",
            backend_name,
            config.input_edge,
            config.min_interval.as_millis()
        );
        Ok(Self {
            backend: Mutex::new(backend),
            backend_name,
            config,
            cache: Mutex::new(DepthCache::default()),
            inferences: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            busy: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn config(&self) -> &DepthEngineConfig {
        &self.config
    }

    /// Depth at normalized `(x, y)`, or the cached sample when throttled, busy
    /// or failing. `None` when there is nothing to return.
    pub fn estimate_at(&self, image: &PackedImage, x: f32, y: f32) -> Option<DepthSample> {
        self.estimate(image, x, y, Instant::now()).sample()
    }

    /// Like `estimate_at`, but reports why a cached sample was returned.
    /// `now` is the capture instant of `image`.
    pub fn estimate(&self, image: &PackedImage, x: f32, y: f32, now: Instant) -> DepthOutcome {
        {
            let cache = self.lock_cache();
            if let Some(last) = cache.last_attempt {
                if now.saturating_duration_since(last) < self.config.min_interval {
                    self.throttled.fetch_add(1, Ordering::Relaxed);
                    return cached(&cache, SkipReason::Throttled);
                }
            }
        }

        let mut backend = match self.backend.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                self.busy.fetch_add(1, Ordering::Relaxed);
                log::debug!("depth backend {} busy", self.backend_name);
                return cached(&self.lock_cache(), SkipReason::Busy);
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                log::warn!(
                    "depth backend {} recovered from a panicked call",
                    self.backend_name
                );
                poisoned.into_inner()
            }
        };

        // Failed attempts count against the interval too.
        self.lock_cache().last_attempt = Some(now);

        let result = self.run(&mut **backend, image, x, y);
        drop(backend);

        match result {
            Ok(depth) => {
                self.inferences.fetch_add(1, Ordering::Relaxed);
                let sample = DepthSample {
                    depth,
                    timestamp: now,
                };
                self.lock_cache().sample = Some(sample);
                DepthOutcome::Fresh(sample)
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("depth estimation failed: {}", err);
                cached(&self.lock_cache(), SkipReason::InferenceFailure)
            }
        }
    }

    fn run(
        &self,
        backend: &mut dyn DepthBackend,
        image: &PackedImage,
        x: f32,
        y: f32,
    ) -> Result<f32, PerceptionError> {
        let edge = self.config.input_edge;
        let rgb = image.to_rgb();
        let input = rgb_to_chw(&rgb, image.width() as usize, image.height() as usize, edge)?;
        let raw = panic::catch_unwind(AssertUnwindSafe(|| backend.infer(&input, edge)))
            .map_err(|_| {
                PerceptionError::InferenceFailure(format!("backend {} panicked", self.backend_name))
            })?
            .map_err(|err| PerceptionError::InferenceFailure(format!("{:#}", err)))?;
        let map = DepthMap::normalize(raw, edge)?;
        Ok(map.sample(x, y))
    }

    /// Forget the cached sample and throttle window (session stop).
    pub fn reset(&self) {
        *self.lock_cache() = DepthCache::default();
    }

    pub fn stats(&self) -> DepthStats {
        DepthStats {
            inferences: self.inferences.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            busy: self.busy.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, DepthCache> {
        // The cache holds plain values; a poisoned lock still has usable state.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn cached(cache: &DepthCache, reason: SkipReason) -> DepthOutcome {
    match cache.sample {
        Some(sample) => DepthOutcome::Stale { sample, reason },
        None => DepthOutcome::Unavailable(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelLayout;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{mpsc, Arc};

    /// Left-to-right ramp: closest at the right edge.
    struct Ramp {
        calls: Arc<AtomicUsize>,
    }

    impl DepthBackend for Ramp {
        fn name(&self) -> &'static str {
            "ramp"
        }

        fn infer(&mut self, _input: &[f32], edge: usize) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..edge * edge).map(|i| (i % edge) as f32).collect())
        }
    }

    struct Failing;

    impl DepthBackend for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn infer(&mut self, _input: &[f32], _edge: usize) -> Result<Vec<f32>> {
            Err(anyhow!("model crashed"))
        }
    }

    enum Step {
        Ramp,
        Fail,
        Panic,
    }

    /// Plays `steps` in order, one per call.
    struct Scripted {
        steps: Vec<Step>,
        next: usize,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self { steps, next: 0 }
        }
    }

    impl DepthBackend for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn infer(&mut self, _input: &[f32], edge: usize) -> Result<Vec<f32>> {
            let step = self.steps.get(self.next).ok_or_else(|| anyhow!("script exhausted"))?;
            self.next += 1;
            match step {
                Step::Ramp => Ok((0..edge * edge).map(|i| (i % edge) as f32).collect()),
                Step::Fail => Err(anyhow!("model crashed")),
                Step::Panic => panic!("tensor shape mismatch"),
            }
        }
    }

    /// Blocks inside `infer` until released, after `open_calls` unblocked calls.
    struct Gate {
        entered: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
        open_calls: usize,
    }

    impl DepthBackend for Gate {
        fn name(&self) -> &'static str {
            "gate"
        }

        fn infer(&mut self, _input: &[f32], edge: usize) -> Result<Vec<f32>> {
            if self.open_calls > 0 {
                self.open_calls -= 1;
            } else {
                self.entered.send(()).ok();
                self.release.recv().ok();
            }
            Ok(vec![1.0; edge * edge])
        }
    }

    fn config() -> DepthEngineConfig {
        DepthEngineConfig {
            input_edge: 28,
            patch_size: 14,
            min_interval: Duration::from_millis(333),
        }
    }

    fn image() -> PackedImage {
        PackedImage::new(8, 8, PixelLayout::Gray8, vec![100; 64]).unwrap()
    }

    #[test]
    fn edge_must_be_whole_patches() {
        let bad = DepthEngineConfig {
            input_edge: 250,
            ..DepthEngineConfig::default()
        };
        assert!(DepthEstimationEngine::new(Failing, bad).is_err());
        assert!(DepthEstimationEngine::new(Failing, DepthEngineConfig::default()).is_ok());
    }

    #[test]
    fn samples_normalized_map_at_point() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = DepthEstimationEngine::new(
            Ramp {
                calls: calls.clone(),
            },
            config(),
        )
        .unwrap();
        let t0 = Instant::now();
        let right = engine.estimate(&image(), 1.0, 0.5, t0);
        assert_eq!(right, DepthOutcome::Fresh(DepthSample { depth: 1.0, timestamp: t0 }));

        let left = engine.estimate(&image(), 0.0, 0.5, t0 + Duration::from_millis(400));
        assert_eq!(left.sample().map(|s| s.depth), Some(0.0));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn calls_inside_interval_return_cached_sample() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = DepthEstimationEngine::new(
            Ramp {
                calls: calls.clone(),
            },
            config(),
        )
        .unwrap();
        let t0 = Instant::now();
        let first = engine.estimate(&image(), 1.0, 0.5, t0);
        let second = engine.estimate(&image(), 0.0, 0.5, t0 + Duration::from_millis(100));

        assert_eq!(
            second,
            DepthOutcome::Stale {
                sample: first.sample().unwrap(),
                reason: SkipReason::Throttled
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.stats().throttled, 1);
    }

    #[test]
    fn failures_fall_back_to_nothing_without_cache() {
        let engine = DepthEstimationEngine::new(Failing, config()).unwrap();
        let outcome = engine.estimate(&image(), 0.5, 0.5, Instant::now());
        assert_eq!(outcome, DepthOutcome::Unavailable(SkipReason::InferenceFailure));
        assert_eq!(engine.estimate_at(&image(), 0.5, 0.5), None);
        assert_eq!(engine.stats().failures, 1);
    }

    #[test]
    fn failure_after_success_returns_earlier_sample() {
        let engine =
            DepthEstimationEngine::new(Scripted::new(vec![Step::Ramp, Step::Fail]), config())
                .unwrap();
        let t0 = Instant::now();
        let first = engine.estimate(&image(), 1.0, 0.5, t0);
        let expected = DepthSample {
            depth: 1.0,
            timestamp: t0,
        };
        assert_eq!(first, DepthOutcome::Fresh(expected));

        let second = engine.estimate(&image(), 0.0, 0.5, t0 + Duration::from_millis(400));
        assert_eq!(
            second,
            DepthOutcome::Stale {
                sample: expected,
                reason: SkipReason::InferenceFailure
            }
        );
        assert_eq!(engine.stats().inferences, 1);
        assert_eq!(engine.stats().failures, 1);
    }

    #[test]
    fn backend_panic_counts_as_failure_and_keeps_cache() {
        let engine = DepthEstimationEngine::new(
            Scripted::new(vec![Step::Ramp, Step::Panic, Step::Ramp]),
            config(),
        )
        .unwrap();
        let t0 = Instant::now();
        let first = engine.estimate(&image(), 1.0, 0.5, t0);
        assert!(first.is_fresh());

        let second = engine.estimate(&image(), 1.0, 0.5, t0 + Duration::from_millis(400));
        assert_eq!(
            second,
            DepthOutcome::Stale {
                sample: first.sample().unwrap(),
                reason: SkipReason::InferenceFailure
            }
        );
        assert_eq!(engine.stats().failures, 1);

        let third = engine.estimate(&image(), 0.0, 0.5, t0 + Duration::from_millis(800));
        assert_eq!(third.sample().map(|s| s.depth), Some(0.0));
        assert!(third.is_fresh());
    }

    #[test]
    fn reset_clears_cache_and_window() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = DepthEstimationEngine::new(
            Ramp {
                calls: calls.clone(),
            },
            config(),
        )
        .unwrap();
        let t0 = Instant::now();
        engine.estimate(&image(), 1.0, 0.5, t0);
        engine.reset();
        let again = engine.estimate(&image(), 1.0, 0.5, t0 + Duration::from_millis(10));
        assert!(again.is_fresh());
    }

    #[test]
    fn concurrent_call_gets_cache_instead_of_waiting() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let engine = Arc::new(
            DepthEstimationEngine::new(
                Gate {
                    entered: entered_tx,
                    release: release_rx,
                    open_calls: 0,
                },
                DepthEngineConfig {
                    min_interval: Duration::ZERO,
                    ..config()
                },
            )
            .unwrap(),
        );

        let t0 = Instant::now();
        let worker = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.estimate(&image(), 0.5, 0.5, t0))
        };
        entered_rx.recv().expect("first call entered backend");

        let second = engine.estimate(&image(), 0.5, 0.5, t0 + Duration::from_millis(1));
        assert_eq!(second, DepthOutcome::Unavailable(SkipReason::Busy));

        release_tx.send(()).expect("release");
        let first = worker.join().expect("worker");
        // Flat map normalizes to 0.5.
        assert_eq!(first.sample().map(|s| s.depth), Some(0.5));
    }

    #[test]
    fn concurrent_call_gets_cached_sample_when_one_exists() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let engine = Arc::new(
            DepthEstimationEngine::new(
                Gate {
                    entered: entered_tx,
                    release: release_rx,
                    open_calls: 1,
                },
                DepthEngineConfig {
                    min_interval: Duration::ZERO,
                    ..config()
                },
            )
            .unwrap(),
        );

        let t0 = Instant::now();
        let primed = engine.estimate(&image(), 0.5, 0.5, t0);
        let cached_sample = primed.sample().expect("first call succeeds");

        let worker = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                engine.estimate(&image(), 0.5, 0.5, t0 + Duration::from_millis(1))
            })
        };
        entered_rx.recv().expect("second call entered backend");

        let busy = engine.estimate(&image(), 0.5, 0.5, t0 + Duration::from_millis(2));
        assert_eq!(
            busy,
            DepthOutcome::Stale {
                sample: cached_sample,
                reason: SkipReason::Busy
            }
        );
        assert_eq!(engine.stats().busy, 1);

        release_tx.send(()).expect("release");
        assert!(worker.join().expect("worker").is_fresh());
    }
}
