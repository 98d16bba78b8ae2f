use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::context::DEFAULT_UPDATE_INTERVAL;
use crate::depth::{DEFAULT_INPUT_EDGE, DEFAULT_MIN_INTERVAL, DEFAULT_PATCH_SIZE};
use crate::haptic::{DEFAULT_APPROACH_BOOST, MAX_BOOST};
use crate::session::DEFAULT_EMPTY_STREAK_LIMIT;
use crate::trend::TrendConfig;

const DEFAULT_SOURCE_URL: &str = "stub://front_camera";
const DEFAULT_SOURCE_FPS: u32 = 15;
const DEFAULT_SOURCE_WIDTH: u32 = 320;
const DEFAULT_SOURCE_HEIGHT: u32 = 240;
const DEFAULT_DETECTOR_INPUT: u32 = 320;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
const DEFAULT_HAPTIC_INTERVAL_MS: u64 = 300;

#[derive(Debug, Deserialize, Default)]
struct SeeConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    depth: Option<DepthConfigFile>,
    trend: Option<TrendConfigFile>,
    context: Option<ContextConfigFile>,
    haptic: Option<HapticConfigFile>,
    session: Option<SessionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    rotation: Option<u32>,
    image_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DepthConfigFile {
    enabled: Option<bool>,
    model_path: Option<PathBuf>,
    input_edge: Option<usize>,
    patch_size: Option<usize>,
    min_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TrendConfigFile {
    capacity: Option<usize>,
    stale_after_ms: Option<u64>,
    min_span_ms: Option<u64>,
    approaching_rate: Option<f32>,
    fast_rate: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ContextConfigFile {
    update_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct HapticConfigFile {
    min_interval_ms: Option<u64>,
    approach_boost: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    empty_streak_limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SeeConfig {
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub depth: DepthSettings,
    pub trend: TrendConfig,
    pub context: ContextSettings,
    pub haptic: HapticSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    /// Sensor rotation in degrees (0, 90, 180 or 270).
    pub rotation: u32,
    /// Serve this still image instead of the synthetic camera.
    pub image_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// ONNX model; the luminance stub detector runs when absent.
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub min_confidence: f32,
}

#[derive(Debug, Clone)]
pub struct DepthSettings {
    pub enabled: bool,
    pub model_path: Option<PathBuf>,
    pub input_edge: usize,
    pub patch_size: usize,
    pub min_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ContextSettings {
    pub update_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct HapticSettings {
    pub min_interval: Duration,
    pub approach_boost: f32,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub empty_streak_limit: u32,
}

impl Default for SeeConfig {
    fn default() -> Self {
        // An empty file section set yields every default and cannot fail.
        Self::from_file(SeeConfigFile::default())
    }
}

impl SeeConfig {
    /// Load configuration from `SEE_CONFIG` (if set), then environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SEE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit path, still honoring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SeeConfigFile) -> Self {
        let source = file.source.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let depth = file.depth.unwrap_or_default();
        let trend = file.trend.unwrap_or_default();
        let context = file.context.unwrap_or_default();
        let haptic = file.haptic.unwrap_or_default();
        let session = file.session.unwrap_or_default();
        let trend_defaults = TrendConfig::default();

        Self {
            source: SourceSettings {
                url: source
                    .url
                    .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                fps: source.fps.unwrap_or(DEFAULT_SOURCE_FPS),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
                rotation: source.rotation.unwrap_or(0),
                image_path: source.image_path,
            },
            detector: DetectorSettings {
                model_path: detector.model_path,
                labels_path: detector.labels_path,
                input_size: detector.input_size.unwrap_or(DEFAULT_DETECTOR_INPUT),
                min_confidence: detector.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
            },
            depth: DepthSettings {
                enabled: depth.enabled.unwrap_or(true),
                model_path: depth.model_path,
                input_edge: depth.input_edge.unwrap_or(DEFAULT_INPUT_EDGE),
                patch_size: depth.patch_size.unwrap_or(DEFAULT_PATCH_SIZE),
                min_interval: depth
                    .min_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_MIN_INTERVAL),
            },
            trend: TrendConfig {
                capacity: trend.capacity.unwrap_or(trend_defaults.capacity),
                stale_after: trend
                    .stale_after_ms
                    .map(Duration::from_millis)
                    .unwrap_or(trend_defaults.stale_after),
                min_span: trend
                    .min_span_ms
                    .map(Duration::from_millis)
                    .unwrap_or(trend_defaults.min_span),
                approaching_rate: trend
                    .approaching_rate
                    .unwrap_or(trend_defaults.approaching_rate),
                fast_rate: trend.fast_rate.unwrap_or(trend_defaults.fast_rate),
            },
            context: ContextSettings {
                update_interval: context
                    .update_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_UPDATE_INTERVAL),
            },
            haptic: HapticSettings {
                min_interval: Duration::from_millis(
                    haptic.min_interval_ms.unwrap_or(DEFAULT_HAPTIC_INTERVAL_MS),
                ),
                approach_boost: haptic.approach_boost.unwrap_or(DEFAULT_APPROACH_BOOST),
            },
            session: SessionSettings {
                empty_streak_limit: session
                    .empty_streak_limit
                    .unwrap_or(DEFAULT_EMPTY_STREAK_LIMIT),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SEE_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(path) = std::env::var("SEE_DETECTOR_MODEL") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("SEE_DEPTH_MODEL") {
            if !path.trim().is_empty() {
                self.depth.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(interval) = std::env::var("SEE_DEPTH_INTERVAL_MS") {
            let millis: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("SEE_DEPTH_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.depth.min_interval = Duration::from_millis(millis);
        }
        if let Ok(boost) = std::env::var("SEE_APPROACH_BOOST") {
            self.haptic.approach_boost = boost
                .trim()
                .parse()
                .map_err(|_| anyhow!("SEE_APPROACH_BOOST must be a number"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.source.url = self.source.url.trim().to_string();
        if self.source.url.is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        if self.source.fps == 0 {
            return Err(anyhow!("source fps must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be non-zero"));
        }
        crate::frame::Rotation::from_degrees(self.source.rotation)
            .map_err(|e| anyhow!("invalid source rotation: {}", e))?;

        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            return Err(anyhow!("detector min_confidence must be within [0, 1]"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }

        if self.depth.patch_size == 0 || self.depth.input_edge == 0 {
            return Err(anyhow!("depth input_edge and patch_size must be non-zero"));
        }
        if self.depth.input_edge % self.depth.patch_size != 0 {
            return Err(anyhow!(
                "depth input_edge {} must be a multiple of patch_size {}",
                self.depth.input_edge,
                self.depth.patch_size
            ));
        }
        if self.depth.min_interval.is_zero() {
            return Err(anyhow!("depth min_interval must be greater than zero"));
        }

        if self.trend.capacity < 2 {
            return Err(anyhow!("trend capacity must hold at least two samples"));
        }
        if self.trend.stale_after.is_zero() {
            return Err(anyhow!("trend stale_after must be greater than zero"));
        }
        if !(self.trend.approaching_rate > 0.0 && self.trend.approaching_rate < self.trend.fast_rate)
        {
            return Err(anyhow!(
                "trend rates must satisfy 0 < approaching_rate < fast_rate"
            ));
        }

        if self.context.update_interval.is_zero() {
            return Err(anyhow!("context update_interval must be greater than zero"));
        }
        if self.haptic.min_interval.is_zero() {
            return Err(anyhow!("haptic min_interval must be greater than zero"));
        }
        if !(0.0..=MAX_BOOST).contains(&self.haptic.approach_boost) {
            return Err(anyhow!(
                "haptic approach_boost must be within [0, {}]",
                MAX_BOOST
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SeeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
