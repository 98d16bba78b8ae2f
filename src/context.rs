//! Context aggregation.
//!
//! Fuses detected obstacles, the primary obstacle's depth trend and optional
//! auxiliary signals (recognized text, scene labels) into one summary string with
//! a priority. The aggregator also gates what reaches the voice sink: a summary
//! goes out only when the update interval has elapsed and the text differs from
//! the last one that went out.

use std::time::{Duration, Instant};

use crate::detect::{DetectedObstacle, Position};
use crate::trend::{DepthChangeResult, Trend};

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(3);
pub const MIN_LABEL_CONFIDENCE: f32 = 0.6;
const MAX_TEXT_BLOCKS: usize = 3;
const MAX_LABELS: usize = 3;

/// Words that make a short text block worth announcing.
const SAFETY_KEYWORDS: &[&str] = &[
    "exit", "entrance", "stop", "danger", "warning", "caution", "emergency", "fire", "push",
    "pull", "open", "closed", "stairs", "elevator", "lift", "floor", "platform", "gate", "bus",
    "train", "station", "street", "road", "crossing", "walk", "wait", "restroom", "toilet",
    "men", "women", "left", "right", "no", "up", "in", "out",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// Scene label from an auxiliary classifier.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneLabel {
    pub text: String,
    pub confidence: f32,
}

impl SceneLabel {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Optional signals supplied by collaborators next to the camera loop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuxSignals {
    pub text_blocks: Option<Vec<String>>,
    pub labels: Option<Vec<SceneLabel>>,
}

/// Everything the aggregator fuses for one frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContextInputs<'a> {
    pub obstacles: Option<&'a [DetectedObstacle]>,
    /// Depth trend of the closest obstacle, keyed by its label.
    pub trend: Option<(&'a str, &'a DepthChangeResult)>,
    pub text_blocks: Option<&'a [String]>,
    pub labels: Option<&'a [SceneLabel]>,
}

impl<'a> ContextInputs<'a> {
    pub fn from_aux(obstacles: &'a [DetectedObstacle], aux: &'a AuxSignals) -> Self {
        Self {
            obstacles: Some(obstacles),
            trend: None,
            text_blocks: aux.text_blocks.as_deref(),
            labels: aux.labels.as_deref(),
        }
    }
}

/// Which inputs contributed to a summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceFlags {
    pub obstacles: bool,
    pub depth_trend: bool,
    pub text: bool,
    pub labels: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ContextSummary {
    pub summary: String,
    pub priority: Priority,
    pub sources: SourceFlags,
}

pub struct ContextAggregator {
    update_interval: Duration,
    last_update: Option<Instant>,
    last_summary: Option<String>,
}

impl ContextAggregator {
    pub fn new(update_interval: Duration) -> Self {
        Self {
            update_interval,
            last_update: None,
            last_summary: None,
        }
    }

    /// Build a summary from whatever inputs are present. Pure: does not touch
    /// the gating state.
    pub fn aggregate(&self, inputs: &ContextInputs<'_>) -> ContextSummary {
        let mut parts = Vec::new();
        let mut sources = SourceFlags::default();
        let mut priority = Priority::Low;

        let obstacles = inputs.obstacles.unwrap_or(&[]);
        if let Some(closest) = closest_obstacle(obstacles) {
            sources.obstacles = true;
            let mut phrase = format!(
                "{} {} {}",
                closest.label,
                distance_phrase(closest.relative_size),
                position_phrase(closest.position)
            );
            if let Some((key, change)) = inputs.trend {
                if key == closest.label && change.is_approaching {
                    sources.depth_trend = true;
                    phrase.push_str(match change.trend {
                        Trend::ApproachingFast => ", approaching fast",
                        _ => ", approaching",
                    });
                    if change.is_danger {
                        priority = Priority::High;
                    }
                }
            }
            if obstacles.len() > 1 {
                let more = obstacles.len() - 1;
                phrase.push_str(&format!(
                    ", and {} more {}",
                    more,
                    if more == 1 { "object" } else { "objects" }
                ));
            }
            if closest.relative_size > 0.15 {
                priority = Priority::High;
            }
            parts.push(phrase);
        }

        let important = important_text(inputs.text_blocks.unwrap_or(&[]));
        if !important.is_empty() {
            sources.text = true;
            if priority < Priority::Medium {
                priority = Priority::Medium;
            }
            let quoted: Vec<String> = important.iter().map(|t| format!("\"{}\"", t)).collect();
            parts.push(format!("Sign reads {}", quoted.join(", ")));
        }

        let labels = top_labels(inputs.labels.unwrap_or(&[]));
        if !labels.is_empty() {
            sources.labels = true;
            parts.push(format!("Scene: {}", labels.join(", ")));
        }

        let summary = if parts.is_empty() {
            "Path clear".to_string()
        } else {
            parts.join(". ")
        };

        ContextSummary {
            summary,
            priority,
            sources,
        }
    }

    /// True when the update interval has elapsed since the last accepted summary.
    pub fn should_update(&self, now: Instant) -> bool {
        match self.last_update {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.update_interval,
        }
    }

    /// True when `summary` differs from the last accepted summary text.
    pub fn is_significant_change(&self, summary: &ContextSummary) -> bool {
        self.last_summary.as_deref() != Some(summary.summary.as_str())
    }

    /// Record `summary` as the last accepted update.
    pub fn commit(&mut self, summary: &ContextSummary, now: Instant) {
        self.last_update = Some(now);
        self.last_summary = Some(summary.summary.clone());
    }

    /// Commit and return `summary` if it is both due and significant.
    pub fn offer(&mut self, summary: ContextSummary, now: Instant) -> Option<ContextSummary> {
        if !self.should_update(now) || !self.is_significant_change(&summary) {
            return None;
        }
        self.commit(&summary, now);
        Some(summary)
    }

    pub fn last_summary(&self) -> Option<&str> {
        self.last_summary.as_deref()
    }

    pub fn reset(&mut self) {
        self.last_update = None;
        self.last_summary = None;
    }
}

impl Default for ContextAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_INTERVAL)
    }
}

fn closest_obstacle(obstacles: &[DetectedObstacle]) -> Option<&DetectedObstacle> {
    obstacles
        .iter()
        .max_by(|a, b| a.relative_size.total_cmp(&b.relative_size))
}

fn distance_phrase(relative_size: f32) -> &'static str {
    if relative_size > 0.25 {
        "very close"
    } else if relative_size > 0.15 {
        "close"
    } else if relative_size > 0.05 {
        "nearby"
    } else {
        "in the distance"
    }
}

fn position_phrase(position: Position) -> &'static str {
    match position {
        Position::Left => "on the left",
        Position::Center => "in the center",
        Position::Right => "on the right",
    }
}

fn is_important_text(text: &str) -> bool {
    let len = text.chars().count();
    if len < 2 {
        return false;
    }
    let lower = text.to_lowercase();
    let has_keyword = lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| SAFETY_KEYWORDS.contains(&word));
    has_keyword || text.chars().any(|c| c.is_ascii_digit()) || len >= 3
}

fn important_text(blocks: &[String]) -> Vec<&str> {
    blocks
        .iter()
        .map(|b| b.trim())
        .filter(|b| is_important_text(b))
        .take(MAX_TEXT_BLOCKS)
        .collect()
}

fn top_labels(labels: &[SceneLabel]) -> Vec<&str> {
    let mut confident: Vec<&SceneLabel> = labels
        .iter()
        .filter(|l| l.confidence > MIN_LABEL_CONFIDENCE && !l.text.trim().is_empty())
        .collect();
    confident.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    confident
        .into_iter()
        .take(MAX_LABELS)
        .map(|l| l.text.trim())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::trend::DistanceCategory;

    fn obstacle(label: &str, position: Position, relative_size: f32) -> DetectedObstacle {
        DetectedObstacle {
            label: label.to_string(),
            position,
            relative_size,
            confidence: 0.9,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        }
    }

    fn change(trend: Trend, depth: f32) -> DepthChangeResult {
        let is_approaching = trend.is_approaching();
        DepthChangeResult {
            depth,
            distance: DistanceCategory::from_depth(depth),
            change_rate: Some(0.2),
            trend,
            is_approaching,
            is_danger: is_approaching && depth > 0.5,
        }
    }

    #[test]
    fn lone_close_chair_is_high_priority() {
        let aggregator = ContextAggregator::default();
        let obstacles = vec![obstacle("chair", Position::Center, 0.30)];
        let summary = aggregator.aggregate(&ContextInputs {
            obstacles: Some(&obstacles),
            ..ContextInputs::default()
        });
        assert_eq!(summary.priority, Priority::High);
        assert!(summary.summary.contains("very close"));
        assert!(summary.summary.contains("center"));
        assert!(summary.sources.obstacles);
        assert!(!summary.sources.text);
    }

    #[test]
    fn largest_obstacle_is_described_with_remaining_count() {
        let aggregator = ContextAggregator::default();
        let obstacles = vec![
            obstacle("cup", Position::Left, 0.02),
            obstacle("table", Position::Right, 0.12),
            obstacle("bag", Position::Center, 0.04),
        ];
        let summary = aggregator.aggregate(&ContextInputs {
            obstacles: Some(&obstacles),
            ..ContextInputs::default()
        });
        assert_eq!(summary.summary, "table nearby on the right, and 2 more objects");
        assert_eq!(summary.priority, Priority::Low);
    }

    #[test]
    fn distance_tiers() {
        assert_eq!(distance_phrase(0.26), "very close");
        assert_eq!(distance_phrase(0.25), "close");
        assert_eq!(distance_phrase(0.16), "close");
        assert_eq!(distance_phrase(0.06), "nearby");
        assert_eq!(distance_phrase(0.05), "in the distance");
    }

    #[test]
    fn important_text_raises_priority_to_medium() {
        let aggregator = ContextAggregator::default();
        let text = vec![
            "a".to_string(),
            "EXIT".to_string(),
            "B2".to_string(),
            "ok".to_string(),
            "Platform 4".to_string(),
            "Gate 9".to_string(),
        ];
        let summary = aggregator.aggregate(&ContextInputs {
            text_blocks: Some(&text),
            ..ContextInputs::default()
        });
        assert_eq!(summary.priority, Priority::Medium);
        assert_eq!(
            summary.summary,
            "Sign reads \"EXIT\", \"B2\", \"Platform 4\""
        );
    }

    #[test]
    fn labels_are_ranked_and_capped() {
        let aggregator = ContextAggregator::default();
        let labels = vec![
            SceneLabel::new("tree", 0.7),
            SceneLabel::new("sky", 0.95),
            SceneLabel::new("blur", 0.5),
            SceneLabel::new("road", 0.8),
            SceneLabel::new("car", 0.65),
        ];
        let summary = aggregator.aggregate(&ContextInputs {
            labels: Some(&labels),
            ..ContextInputs::default()
        });
        assert_eq!(summary.summary, "Scene: sky, road, tree");
        assert_eq!(summary.priority, Priority::Low);
    }

    #[test]
    fn danger_trend_is_high_priority() {
        let aggregator = ContextAggregator::default();
        let obstacles = vec![obstacle("person", Position::Left, 0.08)];
        let danger = change(Trend::ApproachingFast, 0.7);
        let summary = aggregator.aggregate(&ContextInputs {
            obstacles: Some(&obstacles),
            trend: Some(("person", &danger)),
            ..ContextInputs::default()
        });
        assert_eq!(summary.summary, "person nearby on the left, approaching fast");
        assert_eq!(summary.priority, Priority::High);
        assert!(summary.sources.depth_trend);
    }

    #[test]
    fn empty_inputs_report_clear_path() {
        let aggregator = ContextAggregator::default();
        let summary = aggregator.aggregate(&ContextInputs::default());
        assert_eq!(summary.summary, "Path clear");
        assert_eq!(summary.sources, SourceFlags::default());
    }

    #[test]
    fn identical_inputs_are_not_significant_twice() {
        let mut aggregator = ContextAggregator::default();
        let obstacles = vec![obstacle("chair", Position::Center, 0.30)];
        let inputs = ContextInputs {
            obstacles: Some(&obstacles),
            ..ContextInputs::default()
        };
        let t0 = Instant::now();

        let first = aggregator.aggregate(&inputs);
        assert!(aggregator.should_update(t0));
        assert!(aggregator.is_significant_change(&first));
        aggregator.commit(&first, t0);

        let second = aggregator.aggregate(&inputs);
        assert!(!aggregator.is_significant_change(&second));
        assert!(!aggregator.should_update(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn offer_requires_interval_and_new_text() {
        let mut aggregator = ContextAggregator::default();
        let t0 = Instant::now();
        let a = ContextSummary {
            summary: "door ahead".to_string(),
            priority: Priority::Low,
            sources: SourceFlags::default(),
        };
        let b = ContextSummary {
            summary: "stairs ahead".to_string(),
            ..a.clone()
        };

        assert!(aggregator.offer(a.clone(), t0).is_some());
        assert!(aggregator.offer(b.clone(), t0 + Duration::from_secs(2)).is_none());
        assert!(aggregator.offer(a.clone(), t0 + Duration::from_secs(4)).is_none());
        assert!(aggregator.offer(b, t0 + Duration::from_secs(4)).is_some());
        assert_eq!(aggregator.last_summary(), Some("stairs ahead"));

        aggregator.reset();
        assert!(aggregator.offer(a, t0 + Duration::from_secs(5)).is_some());
    }
}
