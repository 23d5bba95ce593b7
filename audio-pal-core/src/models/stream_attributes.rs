use serde::{Deserialize, Serialize};

use super::error::{PalError, Result};

/// Closed set of stream use cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    LowLatency,
    DeepBuffer,
    Compressed,
    Raw,
    VoipRx,
    VoipTx,
    VoiceCall,
    VoiceUi,
    Loopback,
}

impl StreamType {
    pub const ALL: [StreamType; 9] = [
        StreamType::LowLatency,
        StreamType::DeepBuffer,
        StreamType::Compressed,
        StreamType::Raw,
        StreamType::VoipRx,
        StreamType::VoipTx,
        StreamType::VoiceCall,
        StreamType::VoiceUi,
        StreamType::Loopback,
    ];

    /// Whether a stream of this type may be opened in `direction`.
    pub fn supports_direction(&self, direction: StreamDirection) -> bool {
        use StreamDirection::*;
        match self {
            Self::LowLatency => matches!(direction, Output | Input),
            Self::DeepBuffer | Self::Compressed | Self::VoipRx => direction == Output,
            Self::Raw | Self::VoipTx | Self::VoiceUi => direction == Input,
            Self::VoiceCall | Self::Loopback => direction == Bidirectional,
        }
    }

    /// Device routing for these streams follows a global parameter instead of
    /// per-stream device switches.
    pub fn routes_globally(&self) -> bool {
        matches!(self, Self::VoiceUi)
    }

    /// Output classes that may keep queueing data while paused.
    pub fn writes_while_paused(&self) -> bool {
        matches!(self, Self::DeepBuffer | Self::Compressed)
    }
}

/// Data flow direction of a stream or device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamDirection {
    Output,
    Input,
    Bidirectional,
}

impl StreamDirection {
    /// Whether a device flowing in `device_direction` can serve this stream.
    pub fn accepts(&self, device_direction: StreamDirection) -> bool {
        match self {
            Self::Bidirectional => true,
            other => *other == device_direction,
        }
    }

    pub fn has_input(&self) -> bool {
        matches!(self, Self::Input | Self::Bidirectional)
    }

    pub fn has_output(&self) -> bool {
        matches!(self, Self::Output | Self::Bidirectional)
    }
}

/// The key ConcurrencyState and policy rules are indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamClass {
    pub stream_type: StreamType,
    pub direction: StreamDirection,
}

impl StreamClass {
    pub const fn new(stream_type: StreamType, direction: StreamDirection) -> Self {
        Self {
            stream_type,
            direction,
        }
    }
}

impl std::fmt::Display for StreamClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{:?}", self.stream_type, self.direction)
    }
}

/// PCM format requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConfig {
    pub sample_rate: u32,
    pub bit_width: u16,
    pub channels: u16,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            bit_width: 16,
            channels: 2,
        }
    }
}

impl MediaConfig {
    /// Bytes per interleaved frame.
    pub fn frame_size(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bit_width / 8)
    }
}

/// Immutable-at-creation stream descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamAttributes {
    pub stream_type: StreamType,
    pub direction: StreamDirection,
    pub media: MediaConfig,
}

impl StreamAttributes {
    pub fn new(stream_type: StreamType, direction: StreamDirection) -> Self {
        Self {
            stream_type,
            direction,
            media: MediaConfig::default(),
        }
    }

    pub fn with_media(mut self, media: MediaConfig) -> Self {
        self.media = media;
        self
    }

    pub fn class(&self) -> StreamClass {
        StreamClass::new(self.stream_type, self.direction)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.stream_type.supports_direction(self.direction) {
            return Err(PalError::InvalidArgument(format!(
                "{:?} streams cannot be opened as {:?}",
                self.stream_type, self.direction
            )));
        }
        if self.media.sample_rate == 0 {
            return Err(PalError::InvalidArgument("sample rate must be positive".into()));
        }
        if ![16, 24, 32].contains(&self.media.bit_width) {
            return Err(PalError::InvalidArgument(format!(
                "unsupported bit width: {}",
                self.media.bit_width
            )));
        }
        if self.media.channels == 0 {
            return Err(PalError::InvalidArgument("channel count must be positive".into()));
        }
        Ok(())
    }
}

/// Opaque key/value pair passed through to the session graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifierKv {
    pub key: u32,
    pub value: u32,
}
