//! Haptic policy.
//!
//! Maps obstacle proximity (plus an optional approach boost) to a discrete
//! vibration tier, throttled so the user feels at most one pulse group per
//! interval.

use std::time::{Duration, Instant};

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(300);
pub const MAX_BOOST: f32 = 0.5;
/// Boost applied by the session when the primary obstacle is approaching.
pub const DEFAULT_APPROACH_BOOST: f32 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HapticTier {
    None,
    Light,
    Medium,
    Heavy,
}

/// Suggested vibration pattern for a tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PulsePattern {
    pub pulses: u8,
    pub gap: Duration,
}

impl HapticTier {
    pub fn from_proximity(effective: f32) -> Self {
        if effective > 0.10 {
            HapticTier::Heavy
        } else if effective > 0.05 {
            HapticTier::Medium
        } else if effective > 0.01 {
            HapticTier::Light
        } else {
            HapticTier::None
        }
    }

    pub fn pattern(self) -> PulsePattern {
        match self {
            HapticTier::Heavy => PulsePattern {
                pulses: 2,
                gap: Duration::from_millis(100),
            },
            HapticTier::Medium | HapticTier::Light => PulsePattern {
                pulses: 1,
                gap: Duration::ZERO,
            },
            HapticTier::None => PulsePattern {
                pulses: 0,
                gap: Duration::ZERO,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HapticTier::None => "none",
            HapticTier::Light => "light",
            HapticTier::Medium => "medium",
            HapticTier::Heavy => "heavy",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HapticCommand {
    pub tier: HapticTier,
    pub issued_at: Instant,
}

impl HapticCommand {
    pub fn is_none(&self) -> bool {
        self.tier == HapticTier::None
    }
}

pub struct HapticPolicy {
    min_interval: Duration,
    last_issued: Option<Instant>,
}

impl HapticPolicy {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_issued: None,
        }
    }

    pub fn decide(&mut self, proximity: f32, boost: f32) -> HapticCommand {
        self.decide_at(proximity, boost, Instant::now())
    }

    /// Tier for `proximity + boost` at `now`. A non-`none` tier inside the
    /// throttle window degrades to `none`; only issued tiers restart the window.
    pub fn decide_at(&mut self, proximity: f32, boost: f32, now: Instant) -> HapticCommand {
        let boost = if boost.is_finite() {
            boost.clamp(0.0, MAX_BOOST)
        } else {
            0.0
        };
        let proximity = if proximity.is_finite() { proximity } else { 0.0 };
        let effective = (proximity + boost).clamp(0.0, 1.0);

        let mut tier = HapticTier::from_proximity(effective);
        if tier != HapticTier::None {
            let throttled = self
                .last_issued
                .is_some_and(|last| now.saturating_duration_since(last) < self.min_interval);
            if throttled {
                tier = HapticTier::None;
            } else {
                self.last_issued = Some(now);
            }
        }
        HapticCommand {
            tier,
            issued_at: now,
        }
    }

    pub fn reset(&mut self) {
        self.last_issued = None;
    }
}

impl Default for HapticPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}
