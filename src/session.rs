//! Perception session: one frame in, one actuation/announcement decision out.
//!
//! The session owns every piece of state that outlives a single frame: the depth
//! trend histories, the context gate, the haptic throttle and the detection
//! health counter. It runs on exactly one thread (the pipeline worker) and is
//! reset by `stop()`.

use std::time::Duration;

use anyhow::Result;

use crate::config::SeeConfig;
use crate::context::{AuxSignals, ContextAggregator, ContextInputs, ContextSummary};
use crate::depth::{DepthEngineConfig, DepthEstimationEngine, DepthOutcome, DepthStats};
use crate::detect::{DetectedObstacle, DetectionStats, ObjectDetectionAdapter};
use crate::frame::RawFrame;
use crate::haptic::{HapticCommand, HapticPolicy, DEFAULT_APPROACH_BOOST};
use crate::ingest::decode;
use crate::sink::{ActuatorSink, VoiceSink};
use crate::trend::{DepthChangeResult, TrendConfig, TrendTracker};
use crate::PerceptionError;

/// Consecutive empty frames before detection is considered degraded.
pub const DEFAULT_EMPTY_STREAK_LIMIT: u32 = 100;

/// What happened to one frame.
#[derive(Clone, Debug)]
pub struct FrameReport {
    pub obstacles: Vec<DetectedObstacle>,
    pub depth: Option<DepthOutcome>,
    pub depth_change: Option<DepthChangeResult>,
    /// `None` only for skipped frames.
    pub haptic: Option<HapticCommand>,
    /// Summary handed to the voice sink on this frame, if any.
    pub summary: Option<ContextSummary>,
    pub skipped: Option<PerceptionError>,
    pub degraded: bool,
}

impl FrameReport {
    fn skipped(err: PerceptionError, degraded: bool) -> Self {
        Self {
            obstacles: Vec::new(),
            depth: None,
            depth_change: None,
            haptic: None,
            summary: None,
            skipped: Some(err),
            degraded,
        }
    }

    pub fn primary(&self) -> Option<&DetectedObstacle> {
        primary_obstacle(&self.obstacles)
    }

    /// One-line trace of the primary obstacle, e.g. `chair center close approaching`.
    pub fn describe_primary(&self) -> Option<String> {
        let primary = self.primary()?;
        let mut line = format!("{} {}", primary.label, primary.position.as_str());
        if let Some(change) = &self.depth_change {
            line.push(' ');
            line.push_str(change.distance.as_str());
            line.push(' ');
            line.push_str(change.trend.as_str());
        }
        Some(line)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub skipped: u64,
    pub haptic_issued: u64,
    pub announcements: u64,
    pub degraded: bool,
    pub detection: DetectionStats,
    pub depth: Option<DepthStats>,
}

#[derive(Debug)]
struct DetectionHealth {
    limit: u32,
    empty_streak: u32,
    degraded: bool,
}

impl DetectionHealth {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            empty_streak: 0,
            degraded: false,
        }
    }

    fn observe(&mut self, found: bool) -> bool {
        if found {
            if self.degraded {
                log::info!("detection recovered after {} empty frames", self.empty_streak);
            }
            self.empty_streak = 0;
            self.degraded = false;
            return false;
        }
        self.empty_streak = self.empty_streak.saturating_add(1);
        if !self.degraded && self.limit > 0 && self.empty_streak >= self.limit {
            self.degraded = true;
            log::warn!(
                "no detections for {} consecutive frames; still-image capture recommended",
                self.empty_streak
            );
        }
        self.degraded
    }

    fn reset(&mut self) {
        self.empty_streak = 0;
        self.degraded = false;
    }
}

pub struct PerceptionSession {
    detector: ObjectDetectionAdapter,
    depth: Option<DepthEstimationEngine>,
    tracker: TrendTracker,
    aggregator: ContextAggregator,
    haptic: HapticPolicy,
    actuator: Box<dyn ActuatorSink>,
    voice: Box<dyn VoiceSink>,
    approach_boost: f32,
    health: DetectionHealth,
    last_change: Option<(String, DepthChangeResult)>,
    stats: SessionStats,
}

impl PerceptionSession {
    pub fn new(
        detector: ObjectDetectionAdapter,
        actuator: Box<dyn ActuatorSink>,
        voice: Box<dyn VoiceSink>,
    ) -> Self {
        Self {
            detector,
            depth: None,
            tracker: TrendTracker::default(),
            aggregator: ContextAggregator::default(),
            haptic: HapticPolicy::default(),
            actuator,
            voice,
            approach_boost: DEFAULT_APPROACH_BOOST,
            health: DetectionHealth::new(DEFAULT_EMPTY_STREAK_LIMIT),
            last_change: None,
            stats: SessionStats::default(),
        }
    }

    /// Build detector and depth backends from configuration.
    ///
    /// A detector model that cannot be loaded is fatal. A depth model that cannot
    /// be loaded is not: the session runs without depth.
    pub fn from_config(
        cfg: &SeeConfig,
        actuator: Box<dyn ActuatorSink>,
        voice: Box<dyn VoiceSink>,
    ) -> Result<Self> {
        let detector = build_detector(cfg)?;
        detector.warm_up()?;
        let depth = build_depth(cfg)?;
        let mut session = Self::new(detector, actuator, voice)
            .with_trend(cfg.trend.clone())
            .with_context_interval(cfg.context.update_interval)
            .with_haptic_interval(cfg.haptic.min_interval)
            .with_approach_boost(cfg.haptic.approach_boost)
            .with_empty_streak_limit(cfg.session.empty_streak_limit);
        session.depth = depth;
        Ok(session)
    }

    pub fn with_depth(mut self, engine: DepthEstimationEngine) -> Self {
        self.depth = Some(engine);
        self
    }

    pub fn with_trend(mut self, config: TrendConfig) -> Self {
        self.tracker = TrendTracker::new(config);
        self
    }

    pub fn with_context_interval(mut self, interval: Duration) -> Self {
        self.aggregator = ContextAggregator::new(interval);
        self
    }

    pub fn with_haptic_interval(mut self, interval: Duration) -> Self {
        self.haptic = HapticPolicy::new(interval);
        self
    }

    pub fn with_approach_boost(mut self, boost: f32) -> Self {
        self.approach_boost = boost;
        self
    }

    pub fn with_empty_streak_limit(mut self, limit: u32) -> Self {
        self.health = DetectionHealth::new(limit);
        self
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    /// Run one frame through decode, detection, depth, trend, haptics and context.
    /// The frame's capture instant is the clock for every throttle.
    pub fn process_frame(&mut self, frame: &RawFrame, aux: &AuxSignals) -> FrameReport {
        let now = frame.captured_at;
        self.stats.frames += 1;

        let image = match decode(frame) {
            Ok(image) => image,
            Err(err) => {
                self.stats.skipped += 1;
                log::debug!(
                    "skipping frame {} ({} bytes): {}",
                    self.stats.frames,
                    frame.byte_len(),
                    err
                );
                return FrameReport::skipped(err, self.health.degraded);
            }
        };

        let obstacles = self.detector.detect(&image, frame.rotation);
        let degraded = self.health.observe(!obstacles.is_empty());
        self.stats.degraded = degraded;
        let primary = primary_obstacle(&obstacles);

        let mut depth = None;
        let mut depth_change = None;
        if let (Some(primary), Some(engine)) = (primary, self.depth.as_ref()) {
            let (upright_w, upright_h) = frame.rotation.upright_dims(image.width(), image.height());
            let (ux, uy) = primary.normalized_center(upright_w as f32, upright_h as f32);
            let (sx, sy) = frame.rotation.to_sensor(ux, uy);
            let outcome = engine.estimate(&image, sx, sy, now);
            depth_change = match outcome {
                DepthOutcome::Fresh(sample) => {
                    let change = self.tracker.update(&primary.label, sample);
                    self.last_change = Some((primary.label.clone(), change));
                    Some(change)
                }
                DepthOutcome::Stale { .. } => self
                    .last_change
                    .as_ref()
                    .filter(|(label, _)| *label == primary.label)
                    .map(|(_, change)| *change),
                DepthOutcome::Unavailable(_) => None,
            };
            depth = Some(outcome);
        }

        let proximity = primary.map(|p| p.relative_size).unwrap_or(0.0);
        let boost = if depth_change.is_some_and(|c| c.is_approaching) {
            self.approach_boost
        } else {
            0.0
        };
        let command = self.haptic.decide_at(proximity, boost, now);
        if !command.is_none() {
            self.stats.haptic_issued += 1;
            self.actuator.actuate(&command);
        }

        let mut summary = None;
        if self.aggregator.should_update(now) {
            let inputs = ContextInputs {
                trend: primary
                    .zip(depth_change.as_ref())
                    .map(|(p, change)| (p.label.as_str(), change)),
                ..ContextInputs::from_aux(&obstacles, aux)
            };
            let candidate = self.aggregator.aggregate(&inputs);
            summary = self.aggregator.offer(candidate, now);
            if let Some(summary) = &summary {
                self.stats.announcements += 1;
                self.voice.announce(summary);
            }
        }

        FrameReport {
            obstacles,
            depth,
            depth_change,
            haptic: Some(command),
            summary,
            skipped: None,
            degraded,
        }
    }

    /// Clear all cross-frame state. Counters survive for reporting.
    pub fn stop(&mut self) {
        self.tracker.clear();
        self.aggregator.reset();
        self.haptic.reset();
        self.health.reset();
        self.last_change = None;
        if let Some(engine) = &self.depth {
            engine.reset();
        }
        self.stats.degraded = false;
        log::info!(
            "session stopped: frames={} skipped={} haptic={} announced={}",
            self.stats.frames,
            self.stats.skipped,
            self.stats.haptic_issued,
            self.stats.announcements
        );
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            detection: self.detector.stats(),
            depth: self.depth.as_ref().map(|engine| engine.stats()),
            ..self.stats.clone()
        }
    }

    pub fn tracker(&self) -> &TrendTracker {
        &self.tracker
    }
}

fn primary_obstacle(obstacles: &[DetectedObstacle]) -> Option<&DetectedObstacle> {
    obstacles
        .iter()
        .max_by(|a, b| a.relative_size.total_cmp(&b.relative_size))
}

// ---- Backend construction ----

fn build_detector(cfg: &SeeConfig) -> Result<ObjectDetectionAdapter> {
    let settings = &cfg.detector;
    let adapter = match &settings.model_path {
        None => ObjectDetectionAdapter::new(crate::detect::StubDetector::new()),
        Some(path) => {
            #[cfg(feature = "backend-tract")]
            {
                let labels = match &settings.labels_path {
                    Some(labels) => crate::detect::TractDetector::read_labels(labels)?,
                    None => Vec::new(),
                };
                ObjectDetectionAdapter::new(crate::detect::TractDetector::new(
                    path,
                    settings.input_size,
                    labels,
                )?)
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                return Err(anyhow::anyhow!(
                    "detector model {} requires the backend-tract feature",
                    path.display()
                ));
            }
        }
    };
    Ok(adapter.with_min_confidence(settings.min_confidence))
}

fn build_depth(cfg: &SeeConfig) -> Result<Option<DepthEstimationEngine>> {
    let settings = &cfg.depth;
    if !settings.enabled {
        log::info!("depth estimation disabled");
        return Ok(None);
    }
    let engine_cfg = DepthEngineConfig {
        input_edge: settings.input_edge,
        patch_size: settings.patch_size,
        min_interval: settings.min_interval,
    };
    let backend: Box<dyn crate::depth::DepthBackend> = match &settings.model_path {
        None => Box::new(crate::depth::LuminanceDepth::new()),
        Some(path) => match load_depth_model(path, settings.input_edge) {
            Ok(backend) => backend,
            Err(err) => {
                log::warn!("depth model unavailable, continuing without depth: {:#}", err);
                return Ok(None);
            }
        },
    };
    DepthEstimationEngine::from_boxed(backend, engine_cfg).map(Some)
}

#[cfg(feature = "backend-tract")]
fn load_depth_model(
    path: &std::path::Path,
    edge: usize,
) -> Result<Box<dyn crate::depth::DepthBackend>> {
    Ok(Box::new(crate::depth::TractDepth::new(path, edge)?))
}

#[cfg(not(feature = "backend-tract"))]
fn load_depth_model(
    path: &std::path::Path,
    _edge: usize,
) -> Result<Box<dyn crate::depth::DepthBackend>> {
    Err(anyhow::anyhow!(
        "depth model {} requires the backend-tract feature",
        path.display()
    ))
}
