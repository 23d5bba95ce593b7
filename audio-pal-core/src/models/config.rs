use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::device::DeviceId;
use super::error::{PalError, Result};
use super::stream_attributes::StreamDirection;
use crate::routing::device_table::{self, DeviceEntry, DeviceTable};
use crate::routing::policy::{self, ConcurrencyPolicy, PolicyRule};

/// Platform-layer configuration: device capabilities and concurrency policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PalConfig {
    /// Device descriptor table rows.
    #[serde(default = "device_table::default_entries")]
    pub devices: Vec<DeviceEntry>,

    /// Concurrency policy rows.
    #[serde(default = "policy::default_rules")]
    pub policy: Vec<PolicyRule>,

    /// Capture device voice-UI streams are routed to until changed through
    /// the global `VoiceUiCaptureDevice` parameter.
    #[serde(default = "default_voice_ui_device")]
    pub voice_ui_device: DeviceId,
}

fn default_voice_ui_device() -> DeviceId {
    DeviceId::HandsetVaMic
}

impl Default for PalConfig {
    fn default() -> Self {
        Self {
            devices: device_table::default_entries(),
            policy: policy::default_rules(),
            voice_ui_device: default_voice_ui_device(),
        }
    }
}

impl PalConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            PalError::ResourceUnavailable(format!("failed to parse configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            PalError::ResourceUnavailable(format!(
                "failed to read configuration {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.build().map(|_| ())
    }

    /// Builds the read-only tables the resource manager runs on.
    pub fn build(&self) -> Result<(DeviceTable, ConcurrencyPolicy)> {
        let table = DeviceTable::from_entries(self.devices.iter().cloned())?;
        let policy = ConcurrencyPolicy::new(self.policy.clone())?;
        if !table.contains(self.voice_ui_device)
            || self.voice_ui_device.direction() != StreamDirection::Input
        {
            return Err(PalError::ResourceUnavailable(format!(
                "voice UI device {:?} is not a known capture device",
                self.voice_ui_device
            )));
        }
        Ok((table, policy))
    }
}
