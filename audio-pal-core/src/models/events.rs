use super::device::DeviceId;
use crate::routing::policy::PolicyDecision;

/// Events a session reports for its stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    DrainReady,
    PartialDrainReady,
    WriteReady,
    /// Keyword or sound-model detection on a voice-UI stream.
    Detection { model_id: u32, confidence: u8 },
    Error { code: i32 },
}

/// Process-wide events delivered to the registered global callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalEvent {
    SoundCardState { online: bool },
    DeviceConnection { device: DeviceId, connected: bool },
    PolicyApplied(PolicyDecision),
}
