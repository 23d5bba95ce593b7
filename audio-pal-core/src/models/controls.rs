use serde::{Deserialize, Serialize};

use super::error::{PalError, Result};

/// Gain applied to the channels selected by `channel_mask`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelGain {
    pub channel_mask: u32,
    pub gain: f32,
}

/// Per-channel volume request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeData {
    pub gains: Vec<ChannelGain>,
}

impl VolumeData {
    /// Single gain applied to every channel.
    pub fn master(gain: f32) -> Self {
        Self {
            gains: vec![ChannelGain {
                channel_mask: u32::MAX,
                gain,
            }],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.gains.is_empty() {
            return Err(PalError::InvalidArgument("volume has no channel gains".into()));
        }
        for entry in &self.gains {
            if !(0.0..=1.0).contains(&entry.gain) {
                return Err(PalError::InvalidArgument(format!(
                    "gain {} outside 0.0..=1.0",
                    entry.gain
                )));
            }
            if entry.channel_mask == 0 {
                return Err(PalError::InvalidArgument("empty channel mask".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrainType {
    /// Drain everything queued, then signal `DrainReady`.
    Full,
    /// Drain up to the current track boundary (gapless playback).
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioEffect {
    EchoCancellation,
    NoiseSuppression,
    EchoCancellationNoiseSuppression,
}

/// Buffer geometry for one direction of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferConfig {
    pub size: usize,
    pub count: usize,
}

impl BufferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 || self.count == 0 {
            return Err(PalError::InvalidArgument(format!(
                "buffer size {} x {} must be non-zero",
                self.size, self.count
            )));
        }
        Ok(())
    }
}

/// Session clock snapshot, microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionTime {
    pub session_time_us: u64,
    pub absolute_time_us: u64,
    pub timestamp_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MmapBuffer {
    pub buffer_size_frames: u32,
    pub burst_size_frames: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MmapPosition {
    pub position_frames: i64,
    pub time_ns: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_volume_validates() {
        assert!(VolumeData::master(0.5).validate().is_ok());
        assert!(VolumeData::master(1.5).validate().is_err());
        assert!(VolumeData { gains: vec![] }.validate().is_err());
    }

    #[test]
    fn zero_channel_mask_is_rejected() {
        let volume = VolumeData {
            gains: vec![ChannelGain {
                channel_mask: 0,
                gain: 0.2,
            }],
        };
        assert!(volume.validate().unwrap_err().is_invalid_argument());
    }

    #[test]
    fn buffer_config_requires_non_zero_geometry() {
        assert!(BufferConfig { size: 0, count: 4 }.validate().is_err());
        assert!(BufferConfig { size: 960, count: 4 }.validate().is_ok());
    }
}
