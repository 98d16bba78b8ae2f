use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, TryLockError};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{DetectedObstacle, Detection, Position};
use crate::frame::{PackedImage, Rotation};

/// Counters kept by the adapter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub calls: u64,
    pub busy_rejections: u64,
    pub failures: u64,
}

/// Single-flight, fail-soft wrapper around a detector backend.
///
/// `detect` never returns an error: a busy backend, a backend error or a
/// malformed box all turn into fewer (or zero) obstacles.
pub struct ObjectDetectionAdapter {
    backend: Mutex<Box<dyn DetectorBackend>>,
    backend_name: &'static str,
    min_confidence: f32,
    calls: AtomicU64,
    busy_rejections: AtomicU64,
    failures: AtomicU64,
}

impl ObjectDetectionAdapter {
    pub fn new<B: DetectorBackend + 'static>(backend: B) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    pub fn from_boxed(backend: Box<dyn DetectorBackend>) -> Self {
        let backend_name = backend.name();
        Self {
            backend: Mutex::new(backend),
            backend_name,
            min_confidence: 0.0,
            calls: AtomicU64::new(0),
            busy_rejections: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Drop detections whose confidence is below `threshold`.
    pub fn with_min_confidence(mut self, threshold: f32) -> Self {
        self.min_confidence = threshold;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Run the backend warm-up hook. Failures here are fatal to startup.
    pub fn warm_up(&self) -> anyhow::Result<()> {
        let mut guard = self
            .backend
            .lock()
            .map_err(|_| anyhow::anyhow!("detector backend lock poisoned"))?;
        guard.warm_up()
    }

    /// Detect obstacles in `image`, reporting them in the upright frame.
    ///
    /// Returns immediately with no obstacles when another call is in flight.
    pub fn detect(&self, image: &PackedImage, rotation: Rotation) -> Vec<DetectedObstacle> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut guard = match self.backend.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                self.busy_rejections.fetch_add(1, Ordering::Relaxed);
                log::debug!("detector {} busy, dropping frame", self.backend_name);
                return Vec::new();
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                log::warn!(
                    "detector {} recovered from a panicked call",
                    self.backend_name
                );
                poisoned.into_inner()
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| guard.detect(image)));
        drop(guard);
        let raw = match outcome {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("detector {} failed: {:#}", self.backend_name, err);
                return Vec::new();
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("detector {} panicked, dropping frame", self.backend_name);
                return Vec::new();
            }
        };

        let sensor_w = image.width() as f32;
        let sensor_h = image.height() as f32;
        let (upright_w, upright_h) = rotation.upright_dims(image.width(), image.height());
        let (upright_w, upright_h) = (upright_w as f32, upright_h as f32);
        let frame_area = upright_w * upright_h;

        raw.into_iter()
            .filter(|d| d.confidence.is_finite() && d.confidence >= self.min_confidence)
            .filter_map(|d| {
                to_obstacle(
                    d,
                    rotation,
                    (sensor_w, sensor_h),
                    (upright_w, upright_h),
                    frame_area,
                )
            })
            .collect()
    }

    pub fn stats(&self) -> DetectionStats {
        DetectionStats {
            calls: self.calls.load(Ordering::Relaxed),
            busy_rejections: self.busy_rejections.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

fn to_obstacle(
    detection: Detection,
    rotation: Rotation,
    sensor: (f32, f32),
    upright: (f32, f32),
    frame_area: f32,
) -> Option<DetectedObstacle> {
    if !detection.bbox.is_finite() {
        log::debug!("dropping non-finite box for {}", detection.label);
        return None;
    }
    let bbox = detection
        .bbox
        .rotated(rotation, sensor.0, sensor.1)
        .clamped(upright.0, upright.1);
    if bbox.area() <= 0.0 {
        return None;
    }
    let (center_x, _) = bbox.center();
    Some(DetectedObstacle {
        label: detection.label,
        position: Position::from_center(center_x, upright.0),
        relative_size: (bbox.area() / frame_area).clamp(0.0, 1.0),
        confidence: detection.confidence.clamp(0.0, 1.0),
        bbox,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;
    use crate::frame::PixelLayout;
    use anyhow::{anyhow, Result};
    use std::sync::mpsc;
    use std::sync::Arc;

    struct Fixed(Vec<Detection>);

    impl DetectorBackend for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _image: &PackedImage) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl DetectorBackend for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn detect(&mut self, _image: &PackedImage) -> Result<Vec<Detection>> {
            Err(anyhow!("runtime exploded"))
        }
    }

    /// Panics on its first call, then reports one box.
    struct PanicsOnce {
        calls: u32,
    }

    impl DetectorBackend for PanicsOnce {
        fn name(&self) -> &'static str {
            "panics-once"
        }

        fn detect(&mut self, _image: &PackedImage) -> Result<Vec<Detection>> {
            self.calls += 1;
            if self.calls == 1 {
                panic!("model runtime aborted");
            }
            Ok(vec![detection("door", 0.0, 0.0, 10.0, 10.0, 0.9)])
        }
    }

    /// Blocks inside `detect` until released.
    struct Gate {
        entered: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
    }

    impl DetectorBackend for Gate {
        fn name(&self) -> &'static str {
            "gate"
        }

        fn detect(&mut self, _image: &PackedImage) -> Result<Vec<Detection>> {
            self.entered.send(()).ok();
            self.release.recv().ok();
            Ok(vec![detection("door", 0.0, 0.0, 10.0, 10.0, 0.9)])
        }
    }

    fn detection(label: &str, l: f32, t: f32, r: f32, b: f32, confidence: f32) -> Detection {
        Detection {
            label: label.to_string(),
            confidence,
            bbox: BoundingBox::new(l, t, r, b),
        }
    }

    fn gray(width: u32, height: u32) -> PackedImage {
        PackedImage::new(
            width,
            height,
            PixelLayout::Gray8,
            vec![0; (width * height) as usize],
        )
        .unwrap()
    }

    #[test]
    fn obstacles_carry_position_and_relative_size() {
        let adapter = ObjectDetectionAdapter::new(Fixed(vec![
            detection("chair", 0.0, 0.0, 30.0, 50.0, 0.8),
            detection("table", 40.0, 50.0, 60.0, 100.0, 0.7),
            detection("wall", 80.0, 0.0, 100.0, 100.0, 0.6),
        ]));
        let obstacles = adapter.detect(&gray(100, 100), Rotation::Deg0);
        assert_eq!(obstacles.len(), 3);
        assert_eq!(obstacles[0].position, Position::Left);
        assert!((obstacles[0].relative_size - 0.15).abs() < 1e-6);
        assert_eq!(obstacles[1].position, Position::Center);
        assert!((obstacles[1].relative_size - 0.10).abs() < 1e-6);
        assert_eq!(obstacles[2].position, Position::Right);
    }

    #[test]
    fn low_confidence_and_degenerate_boxes_are_dropped() {
        let adapter = ObjectDetectionAdapter::new(Fixed(vec![
            detection("cup", 0.0, 0.0, 10.0, 10.0, 0.2),
            detection("ghost", 5.0, 5.0, 5.0, 9.0, 0.9),
            detection("nan", f32::NAN, 0.0, 10.0, 10.0, 0.9),
            detection("bench", 0.0, 0.0, 10.0, 10.0, 0.9),
        ]))
        .with_min_confidence(0.5);
        let obstacles = adapter.detect(&gray(100, 100), Rotation::Deg0);
        let labels: Vec<_> = obstacles.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["bench"]);
    }

    #[test]
    fn rotated_frames_bucket_in_upright_coordinates() {
        // Sensor 200x100 landscape; box at the sensor's top edge, horizontally centred.
        let adapter =
            ObjectDetectionAdapter::new(Fixed(vec![detection("pole", 80.0, 0.0, 120.0, 10.0, 0.9)]));
        let obstacles = adapter.detect(&gray(200, 100), Rotation::Deg90);
        assert_eq!(obstacles.len(), 1);
        // After a quarter turn the sensor's top edge is the upright right edge.
        assert_eq!(obstacles[0].position, Position::Right);
        assert!((obstacles[0].relative_size - 400.0 / 20_000.0).abs() < 1e-6);
    }

    #[test]
    fn backend_errors_fail_soft() {
        let adapter = ObjectDetectionAdapter::new(Broken);
        assert!(adapter.detect(&gray(10, 10), Rotation::Deg0).is_empty());
        assert_eq!(adapter.stats().failures, 1);
    }

    #[test]
    fn backend_panic_fails_soft_and_next_call_succeeds() {
        let adapter = ObjectDetectionAdapter::new(PanicsOnce { calls: 0 });
        assert!(adapter.detect(&gray(10, 10), Rotation::Deg0).is_empty());
        assert_eq!(adapter.stats().failures, 1);

        let obstacles = adapter.detect(&gray(10, 10), Rotation::Deg0);
        assert_eq!(obstacles.len(), 1);
        assert_eq!(obstacles[0].label, "door");
        assert_eq!(adapter.stats().calls, 2);
        assert_eq!(adapter.stats().failures, 1);
    }

    #[test]
    fn concurrent_call_is_rejected_not_queued() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let adapter = Arc::new(ObjectDetectionAdapter::new(Gate {
            entered: entered_tx,
            release: release_rx,
        }));

        let worker = {
            let adapter = Arc::clone(&adapter);
            std::thread::spawn(move || adapter.detect(&gray(10, 10), Rotation::Deg0))
        };
        entered_rx.recv().expect("first call entered backend");

        assert!(adapter.detect(&gray(10, 10), Rotation::Deg0).is_empty());
        assert_eq!(adapter.stats().busy_rejections, 1);

        release_tx.send(()).expect("release");
        let first = worker.join().expect("worker");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].label, "door");
    }
}
