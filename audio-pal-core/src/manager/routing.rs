use log::{debug, error, info, warn};

use super::{ManagerState, ResourceManager};
use crate::models::device::{DeviceId, DeviceInfo, PalDevice};
use crate::models::error::{PalError, Result};
use crate::models::stream_attributes::{StreamAttributes, StreamType};
use crate::stream::{Stream, StreamId};
use crate::traits::session::{Session, SessionConfig};

impl ResourceManager {
    /// Capability record for `device` as used by `stream_type`.
    pub fn get_device_info(&self, device: DeviceId, stream_type: StreamType) -> Result<DeviceInfo> {
        self.table.info(device, stream_type)
    }

    /// Resolves the concrete format `device` runs at for a stream with
    /// `attributes`, writing it into `device.config`.
    ///
    /// `channels` must be in `1..=max_channels` for the device.
    pub fn get_device_config(
        &self,
        device: &mut PalDevice,
        attributes: &StreamAttributes,
        channels: u16,
    ) -> Result<()> {
        let state = self.state.read();
        self.resolve_config(&state, None, device, attributes, channels)
    }

    /// The devices `stream` is currently routed to, if it is open.
    pub fn bound_devices(&self, stream: StreamId) -> Option<Vec<PalDevice>> {
        self.state.read().bindings.get(&stream).cloned()
    }

    /// Moves `stream` to `devices`. Either every device is validated and the
    /// stream ends up on the new routing, or the previous routing is kept.
    ///
    /// Streams whose routing follows a global parameter are left untouched and
    /// the call succeeds.
    pub fn switch_device(&self, stream: &Stream, devices: &[PalDevice]) -> Result<()> {
        let _events = stream.hold_events();
        let attributes = stream.attributes();
        if attributes.stream_type.routes_globally() {
            debug!(
                "stream {}: {:?} routing follows the global parameter, skipping switch",
                stream.id(),
                attributes.stream_type
            );
            return Ok(());
        }
        if devices.is_empty() {
            return Err(PalError::InvalidArgument("device list is empty".into()));
        }

        let mut state = self.state.write();
        let current = state.bindings.get(&stream.id()).cloned().ok_or_else(|| {
            PalError::InvalidState(format!("stream {} is not routed", stream.id()))
        })?;
        let routed = self.resolve_routing(&state, stream.id(), attributes, devices)?;
        self.reroute(&mut state, stream, current, routed)
    }

    /// Resolves routing for a freshly opened session and connects it. On
    /// failure the session is closed before returning.
    pub(crate) fn attach_session(
        &self,
        stream: &Stream,
        mut session: Box<dyn Session>,
    ) -> Result<()> {
        let mut state = self.state.write();
        let result = if state.card_online {
            self.resolve_routing(&state, stream.id(), stream.attributes(), stream.requested_devices())
                .and_then(|routed| {
                    session.set_config(&SessionConfig::Connect(routed.clone()))?;
                    Ok(routed)
                })
        } else {
            Err(PalError::ResourceUnavailable("sound card is offline".into()))
        };

        match result {
            Ok(routed) => {
                info!(
                    "stream {} routed to {:?}",
                    stream.id(),
                    routed.iter().map(|d| d.id).collect::<Vec<_>>()
                );
                state.bindings.insert(stream.id(), routed);
                stream.install_session(session);
                Ok(())
            }
            Err(e) => {
                if let Err(close_err) = session.close() {
                    error!("stream {}: closing failed session: {}", stream.id(), close_err);
                }
                Err(e)
            }
        }
    }

    /// Validates and resolves every device in `devices` for one stream.
    pub(super) fn resolve_routing(
        &self,
        state: &ManagerState,
        stream: StreamId,
        attributes: &StreamAttributes,
        devices: &[PalDevice],
    ) -> Result<Vec<PalDevice>> {
        let mut routed = Vec::with_capacity(devices.len());
        for requested in devices {
            let info = self.table.info(requested.id, attributes.stream_type)?;
            if !attributes.direction.accepts(requested.id.direction()) {
                return Err(PalError::DeviceConfig(format!(
                    "{:?} cannot serve a {:?} stream",
                    requested.id, attributes.direction
                )));
            }
            let mut device = *requested;
            self.resolve_config(state, Some(stream), &mut device, attributes, info.channels)?;
            routed.push(device);
        }
        Ok(routed)
    }

    pub(super) fn resolve_config(
        &self,
        state: &ManagerState,
        stream: Option<StreamId>,
        device: &mut PalDevice,
        attributes: &StreamAttributes,
        channels: u16,
    ) -> Result<()> {
        let info = self.table.info(device.id, attributes.stream_type)?;
        if channels == 0 || channels > info.max_channels {
            return Err(PalError::DeviceConfig(format!(
                "{:?}: {} channels outside 1..={}",
                device.id, channels, info.max_channels
            )));
        }
        if state.disconnected.contains(&device.id) {
            return Err(PalError::DeviceConfig(format!("{:?} is disconnected", device.id)));
        }

        device.config.channels = channels;
        device.config.sample_rate = if info.supports_rate(attributes.media.sample_rate) {
            attributes.media.sample_rate
        } else {
            info.default_sample_rate
        };
        device.config.bit_width = if info.supports_bit_width(attributes.media.bit_width) {
            attributes.media.bit_width
        } else {
            info.default_bit_width
        };

        // A device shared with another stream keeps its negotiated format.
        let shared = state
            .bindings
            .iter()
            .filter(|(owner, _)| Some(**owner) != stream)
            .flat_map(|(_, devices)| devices.iter())
            .find(|bound| bound.id == device.id);
        if let Some(bound) = shared {
            device.config.sample_rate = bound.config.sample_rate;
            device.config.bit_width = bound.config.bit_width;
        }
        Ok(())
    }

    /// Disconnects `current`, connects `routed`, and restores `current` if the
    /// new routing cannot be applied. If the restore fails too, the stream is
    /// recorded as routed to nothing.
    pub(super) fn reroute(
        &self,
        state: &mut ManagerState,
        stream: &Stream,
        current: Vec<PalDevice>,
        routed: Vec<PalDevice>,
    ) -> Result<()> {
        let mut unrouted = false;
        let outcome = stream.with_session(|session| {
            session.set_config(&SessionConfig::Disconnect(current.clone()))?;
            if let Err(e) = session.set_config(&SessionConfig::Connect(routed.clone())) {
                if let Err(restore) = session.set_config(&SessionConfig::Connect(current.clone())) {
                    error!(
                        "stream {}: restoring previous routing failed: {}",
                        stream.id(),
                        restore
                    );
                    unrouted = true;
                }
                return Err(e.into());
            }
            Ok(())
        });
        if let Err(e) = outcome {
            if unrouted {
                warn!("stream {} is left without routing", stream.id());
                state.bindings.insert(stream.id(), Vec::new());
            }
            return Err(e);
        }

        info!(
            "stream {} switched {:?} -> {:?}",
            stream.id(),
            current.iter().map(|d| d.id).collect::<Vec<_>>(),
            routed.iter().map(|d| d.id).collect::<Vec<_>>()
        );
        state.bindings.insert(stream.id(), routed);
        Ok(())
    }
}
