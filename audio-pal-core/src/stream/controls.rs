use log::{debug, error};

use super::{Stream, StreamInner};
use crate::models::controls::{
    AudioEffect, BufferConfig, DrainType, MmapBuffer, MmapPosition, SessionTime, VolumeData,
};
use crate::models::error::{PalError, Result};
use crate::models::state::StreamState;
use crate::models::stream_attributes::StreamType;
use crate::traits::session::{Session, SessionConfig};

impl Stream {
    pub fn set_volume(&self, volume: &VolumeData) -> Result<()> {
        let _events = self.hold_events();
        volume.validate()?;
        let mut inner = self.inner.lock();
        self.open_session(&mut inner, "set volume")?
            .set_config(&SessionConfig::Volume(volume.clone()))
            .map_err(|e| self.fail("set volume", e.into()))?;
        inner.volume = Some(volume.clone());
        Ok(())
    }

    pub fn volume(&self) -> Option<VolumeData> {
        self.inner.lock().volume.clone()
    }

    /// Sets the client mute. A policy mute stays in force regardless.
    pub fn set_mute(&self, mute: bool) -> Result<()> {
        let _events = self.hold_events();
        let mut inner = self.inner.lock();
        let effective = mute || inner.restrictions.muted;
        self.open_session(&mut inner, "set mute")?
            .set_config(&SessionConfig::Mute(effective))
            .map_err(|e| self.fail("set mute", e.into()))?;
        inner.muted = mute;
        inner.session_muted = effective;
        Ok(())
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().muted
    }

    /// Started → paused. The stream stays counted as active.
    pub fn pause(&self) -> Result<()> {
        let _events = self.hold_events();
        let mut inner = self.inner.lock();
        if inner.state != StreamState::Started {
            return Err(self.wrong_state("pause", inner.state));
        }
        // A suspended session is already paused.
        if !inner.restrictions.suspended {
            self.open_session(&mut inner, "pause")?
                .set_config(&SessionConfig::Pause)
                .map_err(|e| self.fail("pause", e.into()))?;
        }
        inner.state = StreamState::Paused;
        debug!("stream {} paused", self.id);
        Ok(())
    }

    /// Paused → started. A policy suspension keeps the session paused.
    pub fn resume(&self) -> Result<()> {
        let _events = self.hold_events();
        let mut inner = self.inner.lock();
        if inner.state != StreamState::Paused {
            return Err(self.wrong_state("resume", inner.state));
        }
        if !inner.restrictions.suspended {
            self.open_session(&mut inner, "resume")?
                .set_config(&SessionConfig::Resume)
                .map_err(|e| self.fail("resume", e.into()))?;
        }
        inner.state = StreamState::Started;
        debug!("stream {} resumed", self.id);
        Ok(())
    }

    /// Requests a drain; completion arrives as a stream event.
    pub fn drain(&self, drain: DrainType) -> Result<()> {
        let _events = self.hold_events();
        let mut inner = self.inner.lock();
        if inner.state != StreamState::Started {
            return Err(self.wrong_state("drain", inner.state));
        }
        self.open_session(&mut inner, "drain")?
            .drain(drain)
            .map_err(|e| self.fail("drain", e.into()))
    }

    pub fn flush(&self) -> Result<()> {
        let _events = self.hold_events();
        let mut inner = self.inner.lock();
        if !inner.state.is_active() {
            return Err(self.wrong_state("flush", inner.state));
        }
        self.open_session(&mut inner, "flush")?
            .flush()
            .map_err(|e| self.fail("flush", e.into()))
    }

    /// Applies buffer geometry and returns what the back-end settled on.
    pub fn set_buffer_size(
        &self,
        input: Option<BufferConfig>,
        output: Option<BufferConfig>,
    ) -> Result<(Option<BufferConfig>, Option<BufferConfig>)> {
        if input.is_none() && output.is_none() {
            return Err(PalError::InvalidArgument("no buffer configuration given".into()));
        }
        for config in input.iter().chain(output.iter()) {
            config.validate()?;
        }
        if (input.is_some() && !self.attributes.direction.has_input())
            || (output.is_some() && !self.attributes.direction.has_output())
        {
            return Err(PalError::InvalidArgument(format!(
                "buffer configuration does not match a {:?} stream",
                self.attributes.direction
            )));
        }

        let _events = self.hold_events();
        let mut inner = self.inner.lock();
        let negotiated = self
            .open_session(&mut inner, "set buffer size")?
            .set_buffer_size(input, output)
            .map_err(|e| self.fail("set buffer size", e.into()))?;
        inner.buffers = negotiated;
        Ok(negotiated)
    }

    /// Last negotiated `(input, output)` buffer geometry.
    pub fn buffer_sizes(&self) -> (Option<BufferConfig>, Option<BufferConfig>) {
        self.inner.lock().buffers
    }

    pub fn get_timestamp(&self) -> Result<SessionTime> {
        let _events = self.hold_events();
        let mut inner = self.inner.lock();
        self.open_session(&mut inner, "get timestamp")?
            .timestamp()
            .map_err(|e| self.fail("get timestamp", e.into()))
    }

    /// Enables or disables a capture effect. Only VoIP capture streams carry
    /// effects; for every other type the call succeeds without effect.
    pub fn add_remove_effect(&self, effect: AudioEffect, enable: bool) -> Result<()> {
        let _events = self.hold_events();
        let mut inner = self.inner.lock();
        if !inner.state.is_open() {
            return Err(self.wrong_state("add/remove effect", inner.state));
        }
        if self.attributes.stream_type != StreamType::VoipTx {
            debug!(
                "stream {}: effects not applicable to {:?}, ignoring {:?}",
                self.id, self.attributes.stream_type, effect
            );
            return Ok(());
        }
        self.open_session(&mut inner, "add/remove effect")?
            .set_config(&SessionConfig::Effect { effect, enable })
            .map_err(|e| self.fail("add/remove effect", e.into()))?;
        let present = inner.effects.contains(&effect);
        if enable && !present {
            inner.effects.push(effect);
        } else if !enable {
            inner.effects.retain(|e| *e != effect);
        }
        Ok(())
    }

    pub fn effects(&self) -> Vec<AudioEffect> {
        self.inner.lock().effects.clone()
    }

    /// Valid after open and before start.
    pub fn create_mmap_buffer(&self, min_size_frames: u32) -> Result<MmapBuffer> {
        if min_size_frames == 0 {
            return Err(PalError::InvalidArgument("mmap buffer size must be positive".into()));
        }
        let _events = self.hold_events();
        let mut inner = self.inner.lock();
        if !inner.state.can_start() {
            return Err(self.wrong_state("create mmap buffer", inner.state));
        }
        self.open_session(&mut inner, "create mmap buffer")?
            .create_mmap_buffer(min_size_frames)
            .map_err(|e| self.fail("create mmap buffer", e.into()))
    }

    pub fn get_mmap_position(&self) -> Result<MmapPosition> {
        let _events = self.hold_events();
        let mut inner = self.inner.lock();
        self.open_session(&mut inner, "get mmap position")?
            .mmap_position()
            .map_err(|e| self.fail("get mmap position", e.into()))
    }

    /// Stream-scoped parameter write. Before open the value is cached and
    /// replayed into the session when it is created.
    pub fn set_parameters(&self, param_id: u32, payload: &[u8]) -> Result<()> {
        let _events = self.hold_events();
        let mut inner = self.inner.lock();
        match inner.state {
            StreamState::Closed => return Err(self.wrong_state("set parameters", inner.state)),
            StreamState::Idle => {}
            _ => {
                self.open_session(&mut inner, "set parameters")?
                    .set_parameters(param_id, payload)
                    .map_err(|e| self.fail("set parameters", e.into()))?;
            }
        }
        inner.params.insert(param_id, payload.to_vec());
        Ok(())
    }

    /// Last value written for `param_id`.
    pub fn get_parameters(&self, param_id: u32) -> Result<Vec<u8>> {
        let inner = self.inner.lock();
        if inner.state.is_closed() {
            return Err(self.wrong_state("get parameters", inner.state));
        }
        inner.params.get(&param_id).cloned().ok_or_else(|| {
            PalError::InvalidArgument(format!("parameter {:#x} was never set", param_id))
        })
    }

    fn open_session<'a>(
        &self,
        inner: &'a mut StreamInner,
        op: &str,
    ) -> Result<&'a mut Box<dyn Session>> {
        if !inner.state.is_open() {
            return Err(self.wrong_state(op, inner.state));
        }
        let id = self.id;
        inner
            .session
            .as_mut()
            .ok_or_else(|| PalError::InvalidState(format!("stream {} has no session", id)))
    }

    fn wrong_state(&self, op: &str, state: StreamState) -> PalError {
        PalError::InvalidState(format!("stream {}: cannot {} while {}", self.id, op, state))
    }

    fn fail(&self, op: &str, e: PalError) -> PalError {
        error!("stream {}: {} failed: {}", self.id, op, e);
        e
    }
}
