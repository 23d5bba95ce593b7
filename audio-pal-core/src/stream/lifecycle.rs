use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::{debug, error, info};
use parking_lot::Mutex;

use super::relay::EventRelay;
use super::{Stream, StreamInner};
use crate::manager::ResourceManager;
use crate::models::device::PalDevice;
use crate::models::error::{PalError, Result};
use crate::models::state::StreamState;
use crate::models::stream_attributes::{ModifierKv, StreamAttributes};
use crate::routing::policy::Restrictions;
use crate::traits::session::{Session, SessionConfig, SessionContext};

impl Stream {
    /// Validates the request and registers a new idle stream with `manager`.
    /// No session is allocated until [`Stream::open`].
    pub fn create(
        manager: &Arc<ResourceManager>,
        attributes: Option<&StreamAttributes>,
        devices: &[PalDevice],
        modifiers: &[ModifierKv],
    ) -> Result<Arc<Stream>> {
        let attributes = *attributes
            .ok_or_else(|| PalError::InvalidArgument("stream attributes are required".into()))?;
        attributes.validate()?;
        validate_devices(&attributes, devices)?;

        let mut keys = BTreeSet::new();
        if let Some(dup) = modifiers.iter().find(|m| !keys.insert(m.key)) {
            return Err(PalError::InvalidArgument(format!(
                "modifier key {:#x} given twice",
                dup.key
            )));
        }

        let id = manager.allocate_stream_id();
        let stream = Arc::new(Stream {
            id,
            attributes,
            requested: devices.to_vec(),
            modifiers: modifiers.to_vec(),
            manager: Arc::downgrade(manager),
            lifecycle: Mutex::new(()),
            inner: Mutex::new(StreamInner {
                state: StreamState::Idle,
                session: None,
                volume: None,
                muted: false,
                session_muted: false,
                restrictions: Restrictions::default(),
                effects: Vec::new(),
                params: BTreeMap::new(),
                buffers: (None, None),
            }),
            events: EventRelay::new(id),
            counted: Arc::new(AtomicBool::new(false)),
        });
        manager.register_stream(&stream);
        debug!("stream {} created ({})", stream.id, attributes.class());
        Ok(stream)
    }

    /// Allocates the session and routes it to the requested devices.
    ///
    /// On failure no session is left allocated and the stream stays idle, so
    /// it can still be closed.
    pub fn open(&self) -> Result<()> {
        let _events = self.hold_events();
        let _lifecycle = self.lifecycle.lock();
        let state = self.state();
        if state != StreamState::Idle {
            return Err(PalError::InvalidState(format!(
                "stream {} cannot open while {}",
                self.id, state
            )));
        }
        let manager = self.manager()?;

        let result = manager
            .session_factory()
            .make_session(&self.attributes)
            .map_err(PalError::from)
            .and_then(|session| self.bring_up(session))
            .and_then(|session| manager.attach_session(self, session));
        match &result {
            Ok(()) => info!("stream {} opened ({})", self.id, self.attributes.class()),
            Err(e) => error!("stream {}: open failed: {}", self.id, e),
        }
        result
    }

    /// Opens `session`, pushes the media format and replays cached
    /// parameters. Closes the session if any step after open fails.
    fn bring_up(&self, mut session: Box<dyn Session>) -> Result<Box<dyn Session>> {
        let ctx = SessionContext {
            attributes: self.attributes,
            modifiers: self.modifiers.clone(),
            events: self.event_sink(),
        };
        session.open(&ctx)?;

        let params = self.inner.lock().params.clone();
        let configured = session
            .set_config(&SessionConfig::MediaFormat(self.attributes.media))
            .and_then(|()| {
                params
                    .iter()
                    .try_for_each(|(id, payload)| session.set_parameters(*id, payload))
            });
        if let Err(e) = configured {
            if let Err(close_err) = session.close() {
                error!("stream {}: closing half-open session: {}", self.id, close_err);
            }
            return Err(e.into());
        }
        Ok(session)
    }

    /// Starts the session. Only a successful start is reported to the
    /// resource manager.
    pub fn start(&self) -> Result<()> {
        let _events = self.hold_events();
        let _lifecycle = self.lifecycle.lock();
        {
            let mut inner = self.inner.lock();
            if !inner.state.can_start() {
                return Err(PalError::InvalidState(format!(
                    "stream {} cannot start while {}",
                    self.id, inner.state
                )));
            }
            // Policy changes made while stopped were not pushed to the session.
            let muted = inner.muted || inner.restrictions.muted;
            let resync = muted != inner.session_muted;
            let session = inner.session.as_mut().ok_or_else(|| {
                PalError::InvalidState(format!("stream {} has no session", self.id))
            })?;
            if let Err(e) = session.prepare().and_then(|()| session.start()) {
                error!("stream {}: start failed: {}", self.id, e);
                return Err(e.into());
            }
            let resynced = resync
                && match session.set_config(&SessionConfig::Mute(muted)) {
                    Ok(()) => true,
                    Err(e) => {
                        error!("stream {}: restoring mute {} failed: {}", self.id, muted, e);
                        false
                    }
                };
            if resynced {
                inner.session_muted = muted;
            }
            inner.state = StreamState::Started;
        }
        info!("stream {} started", self.id);
        self.notify(true);
        Ok(())
    }

    /// Stops the session. The stream is marked stopped and the deactivation
    /// is reported even when the session fails to stop; that failure is then
    /// returned.
    pub fn stop(&self) -> Result<()> {
        let _events = self.hold_events();
        let _lifecycle = self.lifecycle.lock();
        let result = {
            let mut inner = self.inner.lock();
            if !inner.state.is_active() {
                return Err(PalError::InvalidState(format!(
                    "stream {} cannot stop while {}",
                    self.id, inner.state
                )));
            }
            let result = match inner.session.as_mut() {
                Some(session) => session.stop().map_err(PalError::from),
                None => Ok(()),
            };
            inner.state = StreamState::Stopped;
            result
        };
        self.notify(false);
        match &result {
            Ok(()) => info!("stream {} stopped", self.id),
            Err(e) => error!("stream {}: stop failed, marked stopped anyway: {}", self.id, e),
        }
        result
    }

    /// Releases the session and the manager registration. Terminal; a second
    /// call fails with invalid-state.
    pub fn close(&self) -> Result<()> {
        let _events = self.hold_events();
        let _lifecycle = self.lifecycle.lock();
        let (was_active, session) = {
            let mut inner = self.inner.lock();
            if inner.state.is_closed() {
                return Err(PalError::InvalidState(format!("stream {} is already closed", self.id)));
            }
            let was_active = inner.state.is_active();
            inner.state = StreamState::Closed;
            (was_active, inner.session.take())
        };

        let mut result = Ok(());
        if let Some(mut session) = session {
            if was_active {
                if let Err(e) = session.stop() {
                    error!("stream {}: stop during close failed: {}", self.id, e);
                }
            }
            result = session.close().map_err(PalError::from);
        }
        if was_active {
            self.notify(false);
        }
        if let Some(manager) = self.manager.upgrade() {
            manager.unregister_stream(self.id);
        }

        match &result {
            Ok(()) => info!("stream {} closed", self.id),
            Err(e) => error!("stream {}: session close failed: {}", self.id, e),
        }
        result
    }

    /// Reads captured audio. Valid only while started.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let _events = self.hold_events();
        if !self.attributes.direction.has_input() {
            return Err(PalError::InvalidState(format!(
                "stream {} has no capture path",
                self.id
            )));
        }
        let mut inner = self.inner.lock();
        if inner.state != StreamState::Started {
            return Err(PalError::InvalidState(format!(
                "stream {} cannot read while {}",
                self.id, inner.state
            )));
        }
        read_session(&mut inner, buf).map_err(|e| {
            error!("stream {}: read failed: {}", self.id, e);
            e
        })
    }

    /// Queues playback data. Valid while started, or while paused for
    /// classes that buffer ahead.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let _events = self.hold_events();
        if !self.attributes.direction.has_output() {
            return Err(PalError::InvalidState(format!(
                "stream {} has no playback path",
                self.id
            )));
        }
        let mut inner = self.inner.lock();
        let writable = match inner.state {
            StreamState::Started => true,
            StreamState::Paused => self.attributes.stream_type.writes_while_paused(),
            _ => false,
        };
        if !writable {
            return Err(PalError::InvalidState(format!(
                "stream {} cannot write while {}",
                self.id, inner.state
            )));
        }
        let session = inner.session.as_mut().ok_or_else(|| {
            PalError::InvalidState(format!("stream {} has no session", self.id))
        })?;
        session.write(buf).map_err(|e| {
            error!("stream {}: write failed: {}", self.id, e);
            e.into()
        })
    }
}

fn read_session(inner: &mut StreamInner, buf: &mut [u8]) -> Result<usize> {
    let session = inner
        .session
        .as_mut()
        .ok_or_else(|| PalError::InvalidState("stream has no session".into()))?;
    Ok(session.read(buf)?)
}

fn validate_devices(attributes: &StreamAttributes, devices: &[PalDevice]) -> Result<()> {
    if devices.is_empty() {
        return Err(PalError::InvalidArgument("at least one device is required".into()));
    }
    let mut seen = BTreeSet::new();
    for device in devices {
        if !seen.insert(device.id) {
            return Err(PalError::InvalidArgument(format!("{:?} given twice", device.id)));
        }
        if !attributes.direction.accepts(device.id.direction()) {
            return Err(PalError::InvalidArgument(format!(
                "{:?} cannot serve a {:?} stream",
                device.id, attributes.direction
            )));
        }
    }
    if attributes.direction == crate::models::stream_attributes::StreamDirection::Bidirectional {
        let has_in = devices.iter().any(|d| d.id.direction().has_input());
        let has_out = devices.iter().any(|d| d.id.direction().has_output());
        if !(has_in && has_out) {
            return Err(PalError::InvalidArgument(
                "bidirectional streams need an input and an output device".into(),
            ));
        }
    }
    Ok(())
}
