use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::device::{DeviceId, DeviceInfo};
use crate::models::error::{PalError, Result};
use crate::models::stream_attributes::StreamType;

/// One row of the device descriptor table, as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub id: DeviceId,
    pub channels: u16,
    pub max_channels: u16,
    pub sample_rates: Vec<u32>,
    pub bit_widths: Vec<u16>,
    pub default_sample_rate: u32,
    pub default_bit_width: u16,
    /// Channel counts that differ from `channels` for specific stream types.
    #[serde(default)]
    pub channel_overrides: BTreeMap<StreamType, u16>,
}

impl DeviceEntry {
    fn new(
        id: DeviceId,
        channels: u16,
        max_channels: u16,
        sample_rates: &[u32],
        bit_widths: &[u16],
    ) -> Self {
        Self {
            id,
            channels,
            max_channels,
            sample_rates: sample_rates.to_vec(),
            bit_widths: bit_widths.to_vec(),
            default_sample_rate: sample_rates.last().copied().unwrap_or(48000),
            default_bit_width: bit_widths.first().copied().unwrap_or(16),
            channel_overrides: BTreeMap::new(),
        }
    }

    fn with_override(mut self, stream_type: StreamType, channels: u16) -> Self {
        self.channel_overrides.insert(stream_type, channels);
        self
    }

    fn with_default_rate(mut self, rate: u32) -> Self {
        self.default_sample_rate = rate;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_channels == 0 {
            return Err(PalError::ResourceUnavailable(format!(
                "{:?}: max_channels must be positive",
                self.id
            )));
        }
        let too_wide = std::iter::once(self.channels)
            .chain(self.channel_overrides.values().copied())
            .find(|ch| *ch > self.max_channels);
        if let Some(ch) = too_wide {
            return Err(PalError::ResourceUnavailable(format!(
                "{:?}: {} channels exceeds max {}",
                self.id, ch, self.max_channels
            )));
        }
        if !self.sample_rates.contains(&self.default_sample_rate)
            || !self.bit_widths.contains(&self.default_bit_width)
        {
            return Err(PalError::ResourceUnavailable(format!(
                "{:?}: default format is not in the supported set",
                self.id
            )));
        }
        Ok(())
    }
}

/// Static capability data per physical device. Read-only once built.
#[derive(Debug, Clone)]
pub struct DeviceTable {
    entries: BTreeMap<DeviceId, DeviceEntry>,
}

impl DeviceTable {
    pub fn from_entries(entries: impl IntoIterator<Item = DeviceEntry>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            entry.validate()?;
            let id = entry.id;
            if map.insert(id, entry).is_some() {
                return Err(PalError::ResourceUnavailable(format!(
                    "duplicate device entry {:?}",
                    id
                )));
            }
        }
        if map.is_empty() {
            return Err(PalError::ResourceUnavailable("device table is empty".into()));
        }
        Ok(Self { entries: map })
    }

    /// Capability record for `id` as used by `stream_type`.
    pub fn info(&self, id: DeviceId, stream_type: StreamType) -> Result<DeviceInfo> {
        let entry = self
            .entries
            .get(&id)
            .ok_or_else(|| PalError::DeviceConfig(format!("no descriptor for {:?}", id)))?;
        let channels = entry
            .channel_overrides
            .get(&stream_type)
            .copied()
            .unwrap_or(entry.channels);
        Ok(DeviceInfo {
            id,
            channels,
            max_channels: entry.max_channels,
            sample_rates: entry.sample_rates.clone(),
            bit_widths: entry.bit_widths.clone(),
            default_sample_rate: entry.default_sample_rate,
            default_bit_width: entry.default_bit_width,
        })
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn device_ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.entries.keys().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = &DeviceEntry> {
        self.entries.values()
    }
}

/// Built-in descriptor rows used when no configuration is supplied.
pub fn default_entries() -> Vec<DeviceEntry> {
    use DeviceId::*;
    vec![
        DeviceEntry::new(Speaker, 2, 2, &[44100, 48000], &[16, 24]),
        DeviceEntry::new(Handset, 1, 1, &[8000, 16000, 48000], &[16]),
        DeviceEntry::new(WiredHeadset, 2, 2, &[44100, 48000, 96000], &[16, 24, 32])
            .with_default_rate(48000),
        DeviceEntry::new(WiredHeadphone, 2, 2, &[44100, 48000, 96000], &[16, 24, 32])
            .with_default_rate(48000),
        DeviceEntry::new(LineOut, 2, 2, &[48000], &[16, 24]),
        DeviceEntry::new(BluetoothA2dp, 2, 2, &[44100, 48000], &[16]),
        DeviceEntry::new(BluetoothSco, 1, 1, &[8000, 16000], &[16]),
        DeviceEntry::new(UsbDevice, 2, 8, &[44100, 48000, 96000, 192000], &[16, 24, 32])
            .with_default_rate(48000),
        DeviceEntry::new(HandsetMic, 1, 2, &[8000, 16000, 48000], &[16, 24])
            .with_override(StreamType::VoiceCall, 2),
        DeviceEntry::new(SpeakerMic, 2, 4, &[16000, 48000], &[16, 24]),
        DeviceEntry::new(WiredHeadsetMic, 1, 1, &[8000, 16000, 48000], &[16]),
        DeviceEntry::new(BluetoothScoMic, 1, 1, &[8000, 16000], &[16]),
        DeviceEntry::new(UsbHeadsetMic, 1, 2, &[16000, 48000], &[16, 24]),
        DeviceEntry::new(HandsetVaMic, 1, 4, &[16000, 48000], &[16])
            .with_default_rate(16000)
            .with_override(StreamType::VoiceUi, 3),
    ]
}
