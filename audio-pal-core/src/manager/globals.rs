use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, error, info, warn};

use super::{GlobalCallbackSlot, ManagerState, ResourceManager};
use crate::models::device::{DeviceId, PalDevice};
use crate::models::error::{PalError, Result};
use crate::models::events::GlobalEvent;
use crate::models::params::{GlobalParam, ParamId, ParamQualifier, Rotation};
use crate::models::stream_attributes::{StreamDirection, StreamType};
use crate::stream::RelayHold;
use crate::traits::callback::GlobalCallback;

/// Global (not stream-scoped) parameter values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSettings {
    pub screen_on: bool,
    pub rotation: Rotation,
    pub voice_ui_device: DeviceId,
    gef: BTreeMap<ParamQualifier, Vec<u8>>,
}

impl GlobalSettings {
    pub(super) fn new(voice_ui_device: DeviceId) -> Self {
        Self {
            screen_on: true,
            rotation: Rotation::default(),
            voice_ui_device,
            gef: BTreeMap::new(),
        }
    }
}

impl ResourceManager {
    /// Writes global parameter `param_id`. `qualifier` selects the
    /// device/stream-type target for effect-framework parameters.
    pub fn set_parameter(
        &self,
        param_id: u32,
        payload: &[u8],
        qualifier: Option<ParamQualifier>,
    ) -> Result<()> {
        let mut holds = Vec::new();
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.write();
            if !state.initialized {
                return Err(PalError::InvalidArgument("resource manager is not initialized".into()));
            }
            let id = ParamId::try_from(param_id)?;
            let param = GlobalParam::decode(id, payload)?;
            debug!("set global parameter {:?}", id);
            self.apply_parameter(&mut state, param, qualifier, &mut events, &mut holds)
        };
        for event in events {
            self.emit(event);
        }
        result
    }

    /// Reads global parameter `param_id` in its wire encoding.
    pub fn get_parameter(&self, param_id: u32, qualifier: Option<ParamQualifier>) -> Result<Vec<u8>> {
        let state = self.state.read();
        if !state.initialized {
            return Err(PalError::InvalidArgument("resource manager is not initialized".into()));
        }
        let id = ParamId::try_from(param_id)?;
        let param = match id {
            ParamId::DeviceConnection => {
                let device = require_qualifier(id, qualifier)?.device;
                GlobalParam::DeviceConnection {
                    device,
                    connected: !state.disconnected.contains(&device),
                }
            }
            ParamId::ScreenState => GlobalParam::ScreenState(state.globals.screen_on),
            ParamId::DeviceRotation => GlobalParam::DeviceRotation(state.globals.rotation),
            ParamId::VoiceUiCaptureDevice => {
                GlobalParam::VoiceUiCaptureDevice(state.globals.voice_ui_device)
            }
            ParamId::Gef => {
                let qualifier = require_qualifier(id, qualifier)?;
                let bytes = state.globals.gef.get(&qualifier).cloned().ok_or_else(|| {
                    PalError::InvalidArgument(format!(
                        "no effect parameter stored for {:?}/{:?}",
                        qualifier.device, qualifier.stream_type
                    ))
                })?;
                GlobalParam::Gef(bytes)
            }
        };
        Ok(param.encode())
    }

    /// Snapshot of the non-effect global settings.
    pub fn global_settings(&self) -> GlobalSettings {
        self.state.read().globals.clone()
    }

    /// Registers the process-wide callback, replacing any previous one. Only
    /// a weak reference is kept.
    pub fn register_global_callback(&self, callback: &Arc<dyn GlobalCallback>, cookie: u64) {
        let mut state = self.state.write();
        if state.global_callback.is_some() {
            debug!("replacing global callback");
        }
        state.global_callback = Some(GlobalCallbackSlot {
            callback: Arc::downgrade(callback),
            cookie,
        });
    }

    /// Delivers `event` to the registered global callback, if it is still
    /// alive. Must not be called with the state lock held.
    pub(super) fn emit(&self, event: GlobalEvent) {
        let target = {
            let state = self.state.read();
            state
                .global_callback
                .as_ref()
                .map(|slot| (slot.callback.upgrade(), slot.cookie))
        };
        match target {
            Some((Some(callback), cookie)) => callback.on_global_event(&event, cookie),
            Some((None, _)) => debug!("global callback dropped, discarding {:?}", event),
            None => {}
        }
    }

    fn apply_parameter(
        &self,
        state: &mut ManagerState,
        param: GlobalParam,
        qualifier: Option<ParamQualifier>,
        events: &mut Vec<GlobalEvent>,
        holds: &mut Vec<RelayHold>,
    ) -> Result<()> {
        match param {
            GlobalParam::DeviceConnection { device, connected } => {
                if !self.table.contains(device) {
                    return Err(PalError::InvalidArgument(format!(
                        "{:?} has no descriptor",
                        device
                    )));
                }
                let changed = if connected {
                    state.disconnected.remove(&device)
                } else {
                    state.disconnected.insert(device)
                };
                if changed {
                    info!("{:?} {}", device, if connected { "connected" } else { "disconnected" });
                    events.push(GlobalEvent::DeviceConnection { device, connected });
                }
                Ok(())
            }
            GlobalParam::ScreenState(on) => {
                state.globals.screen_on = on;
                Ok(())
            }
            GlobalParam::DeviceRotation(rotation) => {
                state.globals.rotation = rotation;
                Ok(())
            }
            GlobalParam::VoiceUiCaptureDevice(device) => {
                self.route_voice_ui(state, device, holds)
            }
            GlobalParam::Gef(bytes) => {
                let qualifier = require_qualifier(ParamId::Gef, qualifier)?;
                if !self.table.contains(qualifier.device) {
                    return Err(PalError::InvalidArgument(format!(
                        "{:?} has no descriptor",
                        qualifier.device
                    )));
                }
                state.globals.gef.insert(qualifier, bytes);
                Ok(())
            }
        }
    }

    /// Moves every routed voice-UI stream to `device`.
    fn route_voice_ui(
        &self,
        state: &mut ManagerState,
        device: DeviceId,
        holds: &mut Vec<RelayHold>,
    ) -> Result<()> {
        if device.direction() != StreamDirection::Input || !self.table.contains(device) {
            return Err(PalError::InvalidArgument(format!(
                "{:?} is not a capture device",
                device
            )));
        }

        let targets: Vec<_> = state
            .live_streams()
            .into_iter()
            .filter(|s| s.attributes().stream_type == StreamType::VoiceUi)
            .filter_map(|s| state.bindings.get(&s.id()).cloned().map(|current| (s, current)))
            .collect();

        // Validate every stream's new routing before touching any of them.
        let mut plans = Vec::with_capacity(targets.len());
        for (stream, current) in targets {
            let routed =
                self.resolve_routing(state, stream.id(), stream.attributes(), &[PalDevice::new(device)])?;
            plans.push((stream, current, routed));
        }

        state.globals.voice_ui_device = device;
        let mut first_error = None;
        for (stream, current, routed) in plans {
            holds.push(stream.hold_events());
            if let Err(e) = self.reroute(state, &stream, current, routed) {
                error!("stream {}: voice UI reroute failed: {}", stream.id(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => {
                warn!("voice UI device set to {:?} with failed reroutes", device);
                Err(e)
            }
            None => Ok(()),
        }
    }
}

fn require_qualifier(id: ParamId, qualifier: Option<ParamQualifier>) -> Result<ParamQualifier> {
    qualifier.ok_or_else(|| {
        PalError::InvalidArgument(format!("{:?} requires a device and stream type", id))
    })
}
