//! Output collaborators: the vibration actuator and the voice/text announcer.

use std::sync::{Arc, Mutex};

use crate::context::ContextSummary;
use crate::haptic::HapticCommand;

/// Receives non-`none` haptic commands.
pub trait ActuatorSink: Send {
    fn actuate(&mut self, command: &HapticCommand);
}

/// Receives summaries that passed the due/significant gate.
pub trait VoiceSink: Send {
    fn announce(&mut self, summary: &ContextSummary);
}

/// Writes commands to the log instead of a motor.
#[derive(Debug, Default)]
pub struct LogActuator {
    issued: u64,
}

impl LogActuator {
    pub fn issued(&self) -> u64 {
        self.issued
    }
}

impl ActuatorSink for LogActuator {
    fn actuate(&mut self, command: &HapticCommand) {
        self.issued += 1;
        let pattern = command.tier.pattern();
        log::info!(
            "haptic: tier={} pulses={} gap={}ms",
            command.tier.as_str(),
            pattern.pulses,
            pattern.gap.as_millis()
        );
    }
}

#[derive(Debug, Default)]
pub struct LogVoice {
    announced: u64,
}

impl LogVoice {
    pub fn announced(&self) -> u64 {
        self.announced
    }
}

impl VoiceSink for LogVoice {
    fn announce(&mut self, summary: &ContextSummary) {
        self.announced += 1;
        log::info!(
            "announce [{}]: {}",
            summary.priority.as_str(),
            summary.summary
        );
    }
}

/// Collects everything it receives; shared handle for inspection from another thread.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    commands: Arc<Mutex<Vec<HapticCommand>>>,
    summaries: Arc<Mutex<Vec<ContextSummary>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<HapticCommand> {
        self.commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn summaries(&self) -> Vec<ContextSummary> {
        self.summaries
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl ActuatorSink for RecordingSink {
    fn actuate(&mut self, command: &HapticCommand) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(*command);
        }
    }
}

impl VoiceSink for RecordingSink {
    fn announce(&mut self, summary: &ContextSummary) {
        if let Ok(mut summaries) = self.summaries.lock() {
            summaries.push(summary.clone());
        }
    }
}
