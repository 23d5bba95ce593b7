use serde::{Deserialize, Serialize};

use super::concurrency::ConcurrencyState;
use crate::models::error::{PalError, Result};
use crate::models::stream_attributes::{StreamClass, StreamDirection, StreamType};
use crate::stream::StreamId;

/// What an active trigger class does to a concurrent target class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Mute,
    Suspend,
}

/// One row of the concurrency policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub trigger: StreamClass,
    pub target: StreamClass,
    pub action: PolicyAction,
}

impl PolicyRule {
    pub const fn new(trigger: StreamClass, target: StreamClass, action: PolicyAction) -> Self {
        Self {
            trigger,
            target,
            action,
        }
    }
}

/// Restrictions currently imposed on one stream by policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Restrictions {
    pub muted: bool,
    pub suspended: bool,
}

impl Restrictions {
    pub fn is_empty(&self) -> bool {
        !self.muted && !self.suspended
    }

    fn add(&mut self, action: PolicyAction) {
        match action {
            PolicyAction::Mute => self.muted = true,
            PolicyAction::Suspend => self.suspended = true,
        }
    }

    /// Actions whose state differs between `self` and `next`, with the new
    /// engagement flag.
    pub fn changes_to(&self, next: &Restrictions) -> Vec<(PolicyAction, bool)> {
        let mut changes = Vec::new();
        if self.muted != next.muted {
            changes.push((PolicyAction::Mute, next.muted));
        }
        if self.suspended != next.suspended {
            changes.push((PolicyAction::Suspend, next.suspended));
        }
        changes
    }
}

/// A policy change applied to a live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    pub stream: StreamId,
    pub class: StreamClass,
    pub action: PolicyAction,
    pub engaged: bool,
}

/// Table-driven concurrency policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyPolicy {
    rules: Vec<PolicyRule>,
}

impl ConcurrencyPolicy {
    pub fn new(rules: Vec<PolicyRule>) -> Result<Self> {
        if let Some(rule) = rules.iter().find(|r| r.trigger == r.target) {
            return Err(PalError::ResourceUnavailable(format!(
                "policy rule for {} targets its own class",
                rule.trigger
            )));
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn is_target(&self, class: StreamClass) -> bool {
        self.rules.iter().any(|r| r.target == class)
    }

    /// Restrictions an active stream of `target` class should carry given the
    /// current counts.
    pub fn restrictions_for(&self, target: StreamClass, state: &ConcurrencyState) -> Restrictions {
        let mut restrictions = Restrictions::default();
        for rule in self.rules.iter().filter(|r| r.target == target) {
            if state.is_active(rule.trigger) {
                restrictions.add(rule.action);
            }
        }
        restrictions
    }
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

pub fn default_rules() -> Vec<PolicyRule> {
    use StreamDirection::*;
    let call = StreamClass::new(StreamType::VoiceCall, Bidirectional);
    let voip_tx = StreamClass::new(StreamType::VoipTx, Input);
    let loopback = StreamClass::new(StreamType::Loopback, Bidirectional);
    let raw = StreamClass::new(StreamType::Raw, Input);
    let voice_ui = StreamClass::new(StreamType::VoiceUi, Input);
    let deep_buffer = StreamClass::new(StreamType::DeepBuffer, Output);

    vec![
        PolicyRule::new(call, raw, PolicyAction::Suspend),
        PolicyRule::new(call, voice_ui, PolicyAction::Suspend),
        PolicyRule::new(call, deep_buffer, PolicyAction::Mute),
        PolicyRule::new(voip_tx, voice_ui, PolicyAction::Suspend),
        PolicyRule::new(loopback, raw, PolicyAction::Mute),
    ]
}
