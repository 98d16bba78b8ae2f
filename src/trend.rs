//! Temporal depth trend tracking.
//!
//! Keeps a short FIFO of depth samples per object key and classifies how fast the
//! object is approaching or receding. The key is the detection label, so two
//! objects of the same class share one history; this is a known approximation
//! until a real multi-object tracker sits in front of it.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::depth::DepthSample;

pub const DEFAULT_HISTORY_CAPACITY: usize = 5;
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3);
/// Shortest span that yields a change rate.
pub const DEFAULT_MIN_SPAN: Duration = Duration::from_millis(100);
pub const DEFAULT_APPROACHING_RATE: f32 = 0.05;
pub const DEFAULT_FAST_RATE: f32 = 0.15;
/// Normalized depth above which an approaching object is a danger.
pub const DANGER_DEPTH: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Trend {
    ApproachingFast,
    Approaching,
    Stationary,
    MovingAway,
    MovingAwayFast,
}

impl Trend {
    pub fn is_approaching(self) -> bool {
        matches!(self, Trend::Approaching | Trend::ApproachingFast)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Trend::ApproachingFast => "approaching_fast",
            Trend::Approaching => "approaching",
            Trend::Stationary => "stationary",
            Trend::MovingAway => "moving_away",
            Trend::MovingAwayFast => "moving_away_fast",
        }
    }
}

/// Coarse distance bucket derived from normalized depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DistanceCategory {
    VeryClose,
    Close,
    Medium,
    Far,
}

impl DistanceCategory {
    pub fn from_depth(depth: f32) -> Self {
        if depth > 0.75 {
            DistanceCategory::VeryClose
        } else if depth > 0.5 {
            DistanceCategory::Close
        } else if depth > 0.25 {
            DistanceCategory::Medium
        } else {
            DistanceCategory::Far
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DistanceCategory::VeryClose => "very_close",
            DistanceCategory::Close => "close",
            DistanceCategory::Medium => "medium",
            DistanceCategory::Far => "far",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthChangeResult {
    pub depth: f32,
    pub distance: DistanceCategory,
    /// Normalized depth units per second; `None` without a usable baseline.
    pub change_rate: Option<f32>,
    pub trend: Trend,
    pub is_approaching: bool,
    /// Approaching and already in the closer half. Implies `is_approaching`.
    pub is_danger: bool,
}

#[derive(Clone, Debug)]
pub struct TrendConfig {
    pub capacity: usize,
    pub stale_after: Duration,
    pub min_span: Duration,
    pub approaching_rate: f32,
    pub fast_rate: f32,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
            stale_after: DEFAULT_STALE_AFTER,
            min_span: DEFAULT_MIN_SPAN,
            approaching_rate: DEFAULT_APPROACHING_RATE,
            fast_rate: DEFAULT_FAST_RATE,
        }
    }
}

/// Per-key sliding-window trend classifier.
pub struct TrendTracker {
    config: TrendConfig,
    histories: HashMap<String, VecDeque<DepthSample>>,
}

impl TrendTracker {
    pub fn new(config: TrendConfig) -> Self {
        Self {
            config,
            histories: HashMap::new(),
        }
    }

    /// Record `sample` for `key` and classify the trend against the oldest
    /// retained sample.
    pub fn update(&mut self, key: &str, sample: DepthSample) -> DepthChangeResult {
        self.reclaim_stale(sample);

        let capacity = self.config.capacity.max(1);
        let history = self
            .histories
            .entry(key.to_string())
            .or_insert_with(|| VecDeque::with_capacity(capacity + 1));

        let change_rate = history.front().and_then(|oldest| {
            let span = sample.timestamp.saturating_duration_since(oldest.timestamp);
            (span > self.config.min_span)
                .then(|| (sample.depth - oldest.depth) / span.as_secs_f32())
        });

        history.push_back(sample);
        while history.len() > capacity {
            history.pop_front();
        }

        let trend = self.classify(change_rate);
        let is_approaching = trend.is_approaching();
        DepthChangeResult {
            depth: sample.depth,
            distance: DistanceCategory::from_depth(sample.depth),
            change_rate,
            trend,
            is_approaching,
            is_danger: is_approaching && sample.depth > DANGER_DEPTH,
        }
    }

    fn classify(&self, change_rate: Option<f32>) -> Trend {
        let Some(rate) = change_rate else {
            return Trend::Stationary;
        };
        if rate > self.config.fast_rate {
            Trend::ApproachingFast
        } else if rate > self.config.approaching_rate {
            Trend::Approaching
        } else if rate < -self.config.fast_rate {
            Trend::MovingAwayFast
        } else if rate < -self.config.approaching_rate {
            Trend::MovingAway
        } else {
            Trend::Stationary
        }
    }

    /// Drop every key whose newest sample is older than the stale window.
    fn reclaim_stale(&mut self, now: DepthSample) {
        let stale_after = self.config.stale_after;
        let before = self.histories.len();
        self.histories.retain(|_, history| {
            history.back().is_some_and(|newest| {
                now.timestamp.saturating_duration_since(newest.timestamp) <= stale_after
            })
        });
        let reclaimed = before - self.histories.len();
        if reclaimed > 0 {
            log::debug!("trend tracker reclaimed {} stale keys", reclaimed);
        }
    }

    pub fn history(&self, key: &str) -> Option<&VecDeque<DepthSample>> {
        self.histories.get(key)
    }

    pub fn tracked_keys(&self) -> Vec<String> {
        self.histories.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn clear(&mut self) {
        self.histories.clear();
    }
}

impl Default for TrendTracker {
    fn default() -> Self {
        Self::new(TrendConfig::default())
    }
}
