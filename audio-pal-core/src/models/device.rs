use serde::{Deserialize, Serialize};

use super::stream_attributes::StreamDirection;

/// Physical audio endpoints known to the platform layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceId {
    Speaker,
    Handset,
    WiredHeadset,
    WiredHeadphone,
    LineOut,
    BluetoothA2dp,
    BluetoothSco,
    UsbDevice,
    HandsetMic,
    SpeakerMic,
    WiredHeadsetMic,
    BluetoothScoMic,
    UsbHeadsetMic,
    HandsetVaMic,
}

impl DeviceId {
    pub const ALL: [DeviceId; 14] = [
        DeviceId::Speaker,
        DeviceId::Handset,
        DeviceId::WiredHeadset,
        DeviceId::WiredHeadphone,
        DeviceId::LineOut,
        DeviceId::BluetoothA2dp,
        DeviceId::BluetoothSco,
        DeviceId::UsbDevice,
        DeviceId::HandsetMic,
        DeviceId::SpeakerMic,
        DeviceId::WiredHeadsetMic,
        DeviceId::BluetoothScoMic,
        DeviceId::UsbHeadsetMic,
        DeviceId::HandsetVaMic,
    ];

    pub fn direction(&self) -> StreamDirection {
        match self {
            Self::Speaker
            | Self::Handset
            | Self::WiredHeadset
            | Self::WiredHeadphone
            | Self::LineOut
            | Self::BluetoothA2dp
            | Self::BluetoothSco
            | Self::UsbDevice => StreamDirection::Output,
            _ => StreamDirection::Input,
        }
    }

    /// Numeric id used in global parameter payloads.
    pub fn wire_id(&self) -> u32 {
        // Ids start at 1; 0 is reserved for "no device".
        Self::ALL
            .iter()
            .position(|d| d == self)
            .map_or(0, |i| i as u32 + 1)
    }

    pub fn from_wire_id(id: u32) -> Option<Self> {
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        Self::ALL.get(index).copied()
    }
}

/// Negotiated per-device format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_width: u16,
}

/// A device as requested by a client and, once routed, the configuration the
/// resource manager resolved for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PalDevice {
    pub id: DeviceId,
    pub config: DeviceConfig,
}

impl PalDevice {
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            config: DeviceConfig::default(),
        }
    }
}

/// Static capability record for one device, as seen by one stream type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    /// Channel count used when routing this stream type to the device.
    pub channels: u16,
    pub max_channels: u16,
    pub sample_rates: Vec<u32>,
    pub bit_widths: Vec<u16>,
    pub default_sample_rate: u32,
    pub default_bit_width: u16,
}

impl DeviceInfo {
    pub fn supports_rate(&self, rate: u32) -> bool {
        self.sample_rates.contains(&rate)
    }

    pub fn supports_bit_width(&self, width: u16) -> bool {
        self.bit_widths.contains(&width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_ids_round_trip_for_every_device() {
        for id in DeviceId::ALL {
            assert_eq!(DeviceId::from_wire_id(id.wire_id()), Some(id));
        }
    }

    #[test]
    fn wire_id_zero_and_out_of_range_are_unknown() {
        assert_eq!(DeviceId::from_wire_id(0), None);
        assert_eq!(DeviceId::from_wire_id(DeviceId::ALL.len() as u32 + 1), None);
    }

    #[test]
    fn microphones_are_inputs() {
        assert_eq!(DeviceId::HandsetVaMic.direction(), StreamDirection::Input);
        assert_eq!(DeviceId::BluetoothA2dp.direction(), StreamDirection::Output);
    }
}
