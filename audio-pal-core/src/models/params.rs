//! Global (process-wide) parameter ids and their wire payloads.
//!
//! Payloads are sequences of little-endian `u32` words, except for
//! [`ParamId::Gef`] whose payload is opaque to the platform layer.

use serde::{Deserialize, Serialize};

use super::device::DeviceId;
use super::error::{PalError, Result};
use super::stream_attributes::StreamType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParamId {
    DeviceConnection,
    ScreenState,
    DeviceRotation,
    VoiceUiCaptureDevice,
    Gef,
}

impl ParamId {
    pub fn raw(&self) -> u32 {
        match self {
            Self::DeviceConnection => 0x100,
            Self::ScreenState => 0x101,
            Self::DeviceRotation => 0x102,
            Self::VoiceUiCaptureDevice => 0x103,
            Self::Gef => 0x200,
        }
    }
}

impl TryFrom<u32> for ParamId {
    type Error = PalError;

    fn try_from(raw: u32) -> Result<Self> {
        match raw {
            0x100 => Ok(Self::DeviceConnection),
            0x101 => Ok(Self::ScreenState),
            0x102 => Ok(Self::DeviceRotation),
            0x103 => Ok(Self::VoiceUiCaptureDevice),
            0x200 => Ok(Self::Gef),
            other => Err(PalError::InvalidArgument(format!(
                "unknown parameter id {:#x}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    fn degrees(&self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }
}

/// Device/stream-type qualifier carried by effect-framework parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamQualifier {
    pub device: DeviceId,
    pub stream_type: StreamType,
}

/// A decoded global parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalParam {
    DeviceConnection { device: DeviceId, connected: bool },
    ScreenState(bool),
    DeviceRotation(Rotation),
    VoiceUiCaptureDevice(DeviceId),
    Gef(Vec<u8>),
}

impl GlobalParam {
    pub fn id(&self) -> ParamId {
        match self {
            Self::DeviceConnection { .. } => ParamId::DeviceConnection,
            Self::ScreenState(_) => ParamId::ScreenState,
            Self::DeviceRotation(_) => ParamId::DeviceRotation,
            Self::VoiceUiCaptureDevice(_) => ParamId::VoiceUiCaptureDevice,
            Self::Gef(_) => ParamId::Gef,
        }
    }

    pub fn decode(id: ParamId, payload: &[u8]) -> Result<Self> {
        match id {
            ParamId::DeviceConnection => {
                let [device, connected] = read_words::<2>(id, payload)?;
                Ok(Self::DeviceConnection {
                    device: device_from_wire(device)?,
                    connected: connected != 0,
                })
            }
            ParamId::ScreenState => {
                let [on] = read_words::<1>(id, payload)?;
                Ok(Self::ScreenState(on != 0))
            }
            ParamId::DeviceRotation => {
                let [degrees] = read_words::<1>(id, payload)?;
                Rotation::from_degrees(degrees)
                    .map(Self::DeviceRotation)
                    .ok_or_else(|| {
                        PalError::InvalidArgument(format!("unsupported rotation {}", degrees))
                    })
            }
            ParamId::VoiceUiCaptureDevice => {
                let [device] = read_words::<1>(id, payload)?;
                Ok(Self::VoiceUiCaptureDevice(device_from_wire(device)?))
            }
            ParamId::Gef => {
                if payload.is_empty() {
                    return Err(PalError::InvalidArgument("empty effect payload".into()));
                }
                Ok(Self::Gef(payload.to_vec()))
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let words: Vec<u32> = match self {
            Self::DeviceConnection { device, connected } => {
                vec![device.wire_id(), u32::from(*connected)]
            }
            Self::ScreenState(on) => vec![u32::from(*on)],
            Self::DeviceRotation(rotation) => vec![rotation.degrees()],
            Self::VoiceUiCaptureDevice(device) => vec![device.wire_id()],
            Self::Gef(bytes) => return bytes.clone(),
        };
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

fn read_words<const N: usize>(id: ParamId, payload: &[u8]) -> Result<[u32; N]> {
    if payload.len() != N * 4 {
        return Err(PalError::InvalidArgument(format!(
            "{:?} payload must be {} bytes, got {}",
            id,
            N * 4,
            payload.len()
        )));
    }
    let mut words = [0u32; N];
    for (word, chunk) in words.iter_mut().zip(payload.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(words)
}

fn device_from_wire(raw: u32) -> Result<DeviceId> {
    DeviceId::from_wire_id(raw)
        .ok_or_else(|| PalError::InvalidArgument(format!("unknown device id {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_param_id_is_invalid_argument() {
        let err = ParamId::try_from(0xdead).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn payload_size_is_checked() {
        let err = GlobalParam::decode(ParamId::ScreenState, &[1, 0, 0]).unwrap_err();
        assert!(err.is_invalid_argument());

        let err = GlobalParam::decode(ParamId::DeviceConnection, &[0; 4]).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn device_connection_decodes_little_endian_words() {
        let mut payload = DeviceId::WiredHeadset.wire_id().to_le_bytes().to_vec();
        payload.extend_from_slice(&1u32.to_le_bytes());

        let param = GlobalParam::decode(ParamId::DeviceConnection, &payload).unwrap();
        assert_eq!(
            param,
            GlobalParam::DeviceConnection {
                device: DeviceId::WiredHeadset,
                connected: true
            }
        );
        assert_eq!(param.encode(), payload);
    }

    #[test]
    fn rotation_rejects_odd_angles() {
        let err = GlobalParam::decode(ParamId::DeviceRotation, &45u32.to_le_bytes()).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn unknown_device_in_payload_is_rejected() {
        let err =
            GlobalParam::decode(ParamId::VoiceUiCaptureDevice, &999u32.to_le_bytes()).unwrap_err();
        assert!(err.is_invalid_argument());
    }
}
