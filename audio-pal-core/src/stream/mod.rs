//! Per-client stream state machine.
//!
//! A [`Stream`] wraps one logical audio session. It owns its attributes,
//! requested devices and lifecycle state, and delegates data-path work to a
//! [`Session`]. Device routing is owned by the
//! [`ResourceManager`](crate::manager::ResourceManager).
//!
//! Locking: `lifecycle` serializes open/start/stop/close/switch on one
//! stream and is taken before the manager's state lock; `inner` is taken
//! last and never held across a call into the manager.

mod controls;
pub mod handle;
mod lifecycle;
mod relay;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::{error, warn};
use parking_lot::Mutex;

use crate::manager::ResourceManager;
use crate::models::controls::{AudioEffect, BufferConfig, VolumeData};
use crate::models::device::PalDevice;
use crate::models::error::{PalError, Result};
use crate::models::state::StreamState;
use crate::models::stream_attributes::{ModifierKv, StreamAttributes};
use crate::routing::policy::{PolicyAction, Restrictions};
use crate::traits::callback::StreamCallback;
use crate::traits::session::{Session, SessionConfig, SessionEventSink};

use relay::EventRelay;
pub(crate) use relay::RelayHold;

pub use handle::StreamHandle;

/// Manager-assigned stream identity. Never reused within one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub(crate) u64);

impl StreamId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct StreamInner {
    state: StreamState,
    session: Option<Box<dyn Session>>,
    volume: Option<VolumeData>,
    /// Client mute; the session is muted if this or a policy mute is set.
    muted: bool,
    /// Mute state last pushed to the session.
    session_muted: bool,
    restrictions: Restrictions,
    effects: Vec<AudioEffect>,
    params: BTreeMap<u32, Vec<u8>>,
    buffers: (Option<BufferConfig>, Option<BufferConfig>),
}

pub struct Stream {
    id: StreamId,
    attributes: StreamAttributes,
    requested: Vec<PalDevice>,
    modifiers: Vec<ModifierKv>,
    manager: Weak<ResourceManager>,
    lifecycle: Mutex<()>,
    inner: Mutex<StreamInner>,
    events: Arc<EventRelay>,
    /// Set while the manager counts this stream as active. Shared with the
    /// manager's registration so a stream dropped while active is released.
    counted: Arc<AtomicBool>,
}

impl Stream {
    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn attributes(&self) -> &StreamAttributes {
        &self.attributes
    }

    /// Devices supplied at creation.
    pub fn requested_devices(&self) -> &[PalDevice] {
        &self.requested
    }

    pub fn modifiers(&self) -> &[ModifierKv] {
        &self.modifiers
    }

    pub fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    /// Started or paused.
    pub fn is_active(&self) -> bool {
        self.inner.lock().state.is_active()
    }

    /// Devices the stream is routed to, once opened.
    pub fn bound_devices(&self) -> Option<Vec<PalDevice>> {
        self.manager.upgrade()?.bound_devices(self.id)
    }

    /// Policy restrictions currently in force.
    pub fn restrictions(&self) -> Restrictions {
        self.inner.lock().restrictions
    }

    /// Installs the receiver for this stream's session events, replacing any
    /// previous one.
    pub fn register_callback(&self, callback: Arc<dyn StreamCallback>) {
        self.events.register(callback);
    }

    /// Moves this stream to `devices` through the resource manager.
    pub fn switch_device(&self, devices: &[PalDevice]) -> Result<()> {
        let _events = self.hold_events();
        let _lifecycle = self.lifecycle.lock();
        let manager = self.manager()?;
        manager.switch_device(self, devices).map_err(|e| {
            error!("stream {}: switch device failed: {}", self.id, e);
            e
        })
    }

    /// Runs `f` against the open session.
    pub(crate) fn with_session<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut dyn Session) -> Result<R>,
    {
        let mut inner = self.inner.lock();
        match inner.session.as_mut() {
            Some(session) => f(session.as_mut()),
            None => Err(PalError::InvalidState(format!(
                "stream {} has no session ({})",
                self.id, inner.state
            ))),
        }
    }

    pub(crate) fn install_session(&self, session: Box<dyn Session>) {
        let mut inner = self.inner.lock();
        inner.session = Some(session);
        inner.state = StreamState::Opened;
    }

    /// Brings the session in line with `desired` policy restrictions and
    /// returns the actions that changed. Client mute and pause are preserved.
    ///
    /// An inactive stream only has its restrictions cleared; its stopped
    /// session is left alone and resynchronized on the next start.
    pub(crate) fn apply_restrictions(&self, desired: Restrictions) -> Vec<(PolicyAction, bool)> {
        let mut inner = self.inner.lock();
        let changes = inner.restrictions.changes_to(&desired);
        let client_muted = inner.muted;
        let client_paused = inner.state == StreamState::Paused;
        let active = inner.state.is_active();
        let inner = &mut *inner;

        if let (true, Some(session)) = (active, inner.session.as_mut()) {
            for (action, engaged) in &changes {
                let config = match (action, engaged) {
                    (PolicyAction::Mute, engaged) if !client_muted => Some(SessionConfig::Mute(*engaged)),
                    (PolicyAction::Suspend, true) if !client_paused => Some(SessionConfig::Pause),
                    (PolicyAction::Suspend, false) if !client_paused => Some(SessionConfig::Resume),
                    _ => None,
                };
                if let Some(config) = config {
                    match session.set_config(&config) {
                        Ok(()) => {
                            if let SessionConfig::Mute(muted) = config {
                                inner.session_muted = muted;
                            }
                        }
                        Err(e) => error!("stream {}: applying {:?} failed: {}", self.id, config, e),
                    }
                }
            }
        }
        inner.restrictions = desired;
        changes
    }

    /// Queues this stream's session events until the hold is dropped.
    pub(crate) fn hold_events(&self) -> RelayHold {
        self.events.hold()
    }

    pub(crate) fn activity_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.counted)
    }

    fn event_sink(&self) -> SessionEventSink {
        self.events.sink()
    }

    fn manager(&self) -> Result<Arc<ResourceManager>> {
        self.manager
            .upgrade()
            .ok_or_else(|| PalError::ResourceUnavailable("resource manager is gone".into()))
    }

    /// Reports an activity change for this stream's class.
    fn notify(&self, active: bool) {
        match self.manager.upgrade() {
            Some(manager) => {
                self.counted.store(active, Ordering::Release);
                manager.concurrent_stream_status(self.attributes.class(), active);
            }
            None => error!(
                "stream {}: resource manager is gone, dropping activity {} for {}",
                self.id,
                active,
                self.attributes.class()
            ),
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(mut session) = inner.session.take() {
            warn!("stream {} dropped without close ({})", self.id, inner.state);
            // Any count this stream held is released when the manager prunes
            // its registration.
            if let Err(e) = session.close() {
                error!("stream {}: closing session on drop: {}", self.id, e);
            }
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("class", &self.attributes.class())
            .field("state", &self.state())
            .finish()
    }
}
