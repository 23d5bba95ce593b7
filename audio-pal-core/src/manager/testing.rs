//! Hand-written fakes shared by the core's unit tests.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::ResourceManager;
use crate::models::config::PalConfig;
use crate::models::controls::{DrainType, SessionTime};
use crate::models::device::DeviceId;
use crate::models::error::SessionError;
use crate::models::events::{GlobalEvent, StreamEvent};
use crate::models::stream_attributes::StreamAttributes;
use crate::stream::StreamId;
use crate::traits::callback::{GlobalCallback, StreamCallback};
use crate::traits::monitor::{CardStateCallback, DeviceMonitor};
use crate::traits::session::{Session, SessionConfig, SessionContext, SessionEventSink, SessionFactory};

pub(crate) const FAKE_ERROR: i32 = -5;

pub(crate) fn manager_with_fakes() -> (Arc<ResourceManager>, FakeFactory, FakeMonitor) {
    manager_with_config(&PalConfig::default())
}

pub(crate) fn manager_with_config(config: &PalConfig) -> (Arc<ResourceManager>, FakeFactory, FakeMonitor) {
    let factory = FakeFactory::default();
    let monitor = FakeMonitor::default();
    let manager = ResourceManager::new(config, Arc::new(factory.clone()), Box::new(monitor.clone()))
        .unwrap();
    (Arc::new(manager), factory, monitor)
}

#[derive(Default)]
struct SessionState {
    calls: Vec<&'static str>,
    configs: Vec<SessionConfig>,
    connected: Vec<DeviceId>,
    params: Vec<(u32, Vec<u8>)>,
    written: Vec<u8>,
    paused: bool,
    muted: bool,
    failing: BTreeSet<&'static str>,
    fail_connect: BTreeSet<DeviceId>,
    events: Option<SessionEventSink>,
}

/// Test-side view of a [`FakeSession`].
#[derive(Clone, Default)]
pub(crate) struct FakeSessionHandle(Arc<Mutex<SessionState>>);

impl FakeSessionHandle {
    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.0.lock().calls.clone()
    }

    pub(crate) fn configs(&self) -> Vec<SessionConfig> {
        self.0.lock().configs.clone()
    }

    pub(crate) fn connected(&self) -> Vec<DeviceId> {
        self.0.lock().connected.clone()
    }

    pub(crate) fn params(&self) -> Vec<(u32, Vec<u8>)> {
        self.0.lock().params.clone()
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.0.lock().written.clone()
    }

    pub(crate) fn paused(&self) -> bool {
        self.0.lock().paused
    }

    pub(crate) fn muted(&self) -> bool {
        self.0.lock().muted
    }

    pub(crate) fn closes(&self) -> usize {
        self.0.lock().calls.iter().filter(|c| **c == "close").count()
    }

    /// Make every later call to `op` fail.
    pub(crate) fn fail(&self, op: &'static str) {
        self.0.lock().failing.insert(op);
    }

    pub(crate) fn fail_connect_to(&self, device: DeviceId) {
        self.0.lock().fail_connect.insert(device);
    }

    /// Report `event` as if the back-end raised it.
    pub(crate) fn raise(&self, event: StreamEvent) {
        let sink = self.0.lock().events.clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }
}

struct FakeSession(FakeSessionHandle);

impl FakeSession {
    fn enter(&self, op: &'static str) -> Result<(), SessionError> {
        let mut state = self.0 .0.lock();
        state.calls.push(op);
        if state.failing.contains(op) {
            Err(SessionError::new(FAKE_ERROR, format!("{} failed", op)))
        } else {
            Ok(())
        }
    }
}

impl Session for FakeSession {
    fn open(&mut self, ctx: &SessionContext) -> Result<(), SessionError> {
        self.enter("open")?;
        self.0 .0.lock().events = Some(Arc::clone(&ctx.events));
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), SessionError> {
        self.enter("prepare")
    }

    fn start(&mut self) -> Result<(), SessionError> {
        self.enter("start")?;
        self.0 .0.lock().paused = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SessionError> {
        self.enter("stop")
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.enter("close")
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
        self.enter("read")?;
        buf.fill(0);
        Ok(buf.len())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, SessionError> {
        self.enter("write")?;
        self.0 .0.lock().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn set_config(&mut self, config: &SessionConfig) -> Result<(), SessionError> {
        self.enter("set_config")?;
        let mut state = self.0 .0.lock();
        state.configs.push(config.clone());
        match config {
            SessionConfig::Connect(devices) => {
                if let Some(bad) = devices.iter().find(|d| state.fail_connect.contains(&d.id)) {
                    return Err(SessionError::new(FAKE_ERROR, format!("cannot connect {:?}", bad.id)));
                }
                state.connected.extend(devices.iter().map(|d| d.id));
            }
            SessionConfig::Disconnect(devices) => {
                state.connected.retain(|id| devices.iter().all(|d| d.id != *id));
            }
            SessionConfig::Pause => state.paused = true,
            SessionConfig::Resume => state.paused = false,
            SessionConfig::Mute(muted) => state.muted = *muted,
            _ => {}
        }
        Ok(())
    }

    fn set_parameters(&mut self, param_id: u32, payload: &[u8]) -> Result<(), SessionError> {
        self.enter("set_parameters")?;
        self.0 .0.lock().params.push((param_id, payload.to_vec()));
        Ok(())
    }

    fn drain(&mut self, drain: DrainType) -> Result<(), SessionError> {
        self.enter("drain")?;
        let event = match drain {
            DrainType::Full => StreamEvent::DrainReady,
            DrainType::Partial => StreamEvent::PartialDrainReady,
        };
        self.0.raise(event);
        Ok(())
    }

    fn timestamp(&mut self) -> Result<SessionTime, SessionError> {
        self.enter("timestamp")?;
        Ok(SessionTime {
            session_time_us: 1_000,
            absolute_time_us: 2_000,
            timestamp_us: 3_000,
        })
    }
}

#[derive(Default)]
struct FactoryState {
    sessions: Vec<FakeSessionHandle>,
    fail_make: bool,
    preset: Vec<&'static str>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeFactory(Arc<Mutex<FactoryState>>);

impl FakeFactory {
    pub(crate) fn last_session(&self) -> FakeSessionHandle {
        self.0.lock().sessions.last().cloned().expect("no session was created")
    }

    pub(crate) fn session_count(&self) -> usize {
        self.0.lock().sessions.len()
    }

    pub(crate) fn fail_next_make(&self) {
        self.0.lock().fail_make = true;
    }

    /// The next session created fails every call to `op`.
    pub(crate) fn fail_in_next_session(&self, op: &'static str) {
        self.0.lock().preset.push(op);
    }
}

impl SessionFactory for FakeFactory {
    fn make_session(&self, _attributes: &StreamAttributes) -> Result<Box<dyn Session>, SessionError> {
        let mut state = self.0.lock();
        if std::mem::take(&mut state.fail_make) {
            return Err(SessionError::new(FAKE_ERROR, "no graph available"));
        }
        let handle = FakeSessionHandle::default();
        for op in state.preset.drain(..) {
            handle.fail(op);
        }
        state.sessions.push(handle.clone());
        Ok(Box::new(FakeSession(handle)))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct MonitorState {
    callback: Option<CardStateCallback>,
    starts: usize,
    fail_next: bool,
    online: bool,
}

#[derive(Clone)]
pub(crate) struct FakeMonitor(Arc<Mutex<MonitorState>>);

impl Default for FakeMonitor {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(MonitorState {
            callback: None,
            starts: 0,
            fail_next: false,
            online: true,
        })))
    }
}

impl FakeMonitor {
    pub(crate) fn starts(&self) -> usize {
        self.0.lock().starts
    }

    pub(crate) fn fail_next_start(&self) {
        self.0.lock().fail_next = true;
    }

    pub(crate) fn set_online(&self, online: bool) {
        let callback = {
            let mut state = self.0.lock();
            state.online = online;
            state.callback.clone()
        };
        if let Some(callback) = callback {
            callback(online);
        }
    }
}

impl DeviceMonitor for FakeMonitor {
    fn start(&mut self, callback: CardStateCallback) -> Result<(), SessionError> {
        let mut state = self.0.lock();
        if std::mem::take(&mut state.fail_next) {
            return Err(SessionError::new(FAKE_ERROR, "monitor service unavailable"));
        }
        state.starts += 1;
        state.callback = Some(callback);
        Ok(())
    }

    fn stop(&mut self) {
        self.0.lock().callback = None;
    }

    fn is_online(&self) -> bool {
        self.0.lock().online
    }
}

/// Records every global and stream event it receives.
#[derive(Default)]
pub(crate) struct RecordingCallback {
    global: Mutex<Vec<(GlobalEvent, u64)>>,
    stream: Mutex<Vec<(StreamId, StreamEvent)>>,
}

impl RecordingCallback {
    pub(crate) fn events(&self) -> Vec<(GlobalEvent, u64)> {
        self.global.lock().clone()
    }

    pub(crate) fn stream_events(&self) -> Vec<(StreamId, StreamEvent)> {
        self.stream.lock().clone()
    }
}

impl GlobalCallback for RecordingCallback {
    fn on_global_event(&self, event: &GlobalEvent, cookie: u64) {
        self.global.lock().push((event.clone(), cookie));
    }
}

impl StreamCallback for RecordingCallback {
    fn on_event(&self, stream: StreamId, event: &StreamEvent) {
        self.stream.lock().push((stream, event.clone()));
    }
}
