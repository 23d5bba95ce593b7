//! In-memory session back-end.
//!
//! A [`MemorySession`] is a loopback graph: bytes written to it are queued
//! in a ring buffer and handed back by reads. Capture reads pad with silence
//! so a running input never starves. Every session reports its state through
//! a [`SessionView`] that tests and tools can inspect.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use audio_pal_core::models::controls::{
    AudioEffect, BufferConfig, DrainType, MmapBuffer, MmapPosition, SessionTime, VolumeData,
};
use audio_pal_core::models::device::DeviceId;
use audio_pal_core::models::error::SessionError;
use audio_pal_core::models::events::StreamEvent;
use audio_pal_core::models::stream_attributes::{MediaConfig, StreamAttributes};
use audio_pal_core::traits::session::{
    Session, SessionConfig, SessionContext, SessionEventSink, SessionFactory,
};

use crate::faults::{FaultPlan, SessionOp};
use crate::ring_buffer::RingBuffer;

/// Queue depth used until the client negotiates buffer sizes.
const DEFAULT_QUEUE_BYTES: usize = 64 * 1024;

/// Lifecycle phase of a simulated graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Created,
    Opened,
    Prepared,
    Running,
    Stopped,
    Closed,
}

#[derive(Debug)]
struct SessionShared {
    phase: SessionPhase,
    attributes: Option<StreamAttributes>,
    media: MediaConfig,
    connected: Vec<DeviceId>,
    paused: bool,
    muted: bool,
    volume: Option<VolumeData>,
    effects: Vec<AudioEffect>,
    params: BTreeMap<u32, Vec<u8>>,
    queue: RingBuffer,
    bytes_written: u64,
    bytes_read: u64,
    started_at: Option<DateTime<Utc>>,
    mmap: Option<MmapBuffer>,
}

/// Read-only view of one [`MemorySession`], plus event injection.
#[derive(Clone)]
pub struct SessionView {
    id: Uuid,
    shared: Arc<Mutex<SessionShared>>,
    events: Arc<Mutex<Option<SessionEventSink>>>,
}

impl SessionView {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.lock().phase
    }

    pub fn connected(&self) -> Vec<DeviceId> {
        self.shared.lock().connected.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    pub fn is_muted(&self) -> bool {
        self.shared.lock().muted
    }

    pub fn volume(&self) -> Option<VolumeData> {
        self.shared.lock().volume.clone()
    }

    pub fn effects(&self) -> Vec<AudioEffect> {
        self.shared.lock().effects.clone()
    }

    pub fn param(&self, id: u32) -> Option<Vec<u8>> {
        self.shared.lock().params.get(&id).cloned()
    }

    /// Bytes waiting in the loopback queue.
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.count()
    }

    pub fn media(&self) -> MediaConfig {
        self.shared.lock().media
    }

    /// Attributes the graph was opened with.
    pub fn attributes(&self) -> Option<StreamAttributes> {
        self.shared.lock().attributes
    }

    /// Raise `event` as if the graph produced it, e.g. a keyword detection.
    pub fn raise(&self, event: StreamEvent) {
        let sink = self.events.lock().clone();
        match sink {
            Some(sink) => sink(event),
            None => warn!("session {}: event {:?} raised before open", self.id, event),
        }
    }
}

pub struct MemorySession {
    view: SessionView,
    faults: FaultPlan,
}

impl MemorySession {
    pub fn new(faults: FaultPlan) -> Self {
        let view = SessionView {
            id: Uuid::new_v4(),
            shared: Arc::new(Mutex::new(SessionShared {
                phase: SessionPhase::Created,
                attributes: None,
                media: MediaConfig::default(),
                connected: Vec::new(),
                paused: false,
                muted: false,
                volume: None,
                effects: Vec::new(),
                params: BTreeMap::new(),
                queue: RingBuffer::new(DEFAULT_QUEUE_BYTES),
                bytes_written: 0,
                bytes_read: 0,
                started_at: None,
                mmap: None,
            })),
            events: Arc::new(Mutex::new(None)),
        };
        Self { view, faults }
    }

    pub fn view(&self) -> SessionView {
        self.view.clone()
    }

    fn expect_phase(&self, op: &str, allowed: &[SessionPhase]) -> Result<(), SessionError> {
        let phase = self.view.phase();
        if allowed.contains(&phase) {
            Ok(())
        } else {
            Err(SessionError::new(
                -38,
                format!("{} not valid in phase {:?}", op, phase),
            ))
        }
    }

    fn emit(&self, event: StreamEvent) {
        self.view.raise(event);
    }

    fn frames(media: &MediaConfig, bytes: u64) -> u64 {
        let frame = media.frame_size().max(1) as u64;
        bytes / frame
    }
}

impl Session for MemorySession {
    fn open(&mut self, ctx: &SessionContext) -> Result<(), SessionError> {
        self.faults.check(SessionOp::Open)?;
        self.expect_phase("open", &[SessionPhase::Created])?;
        {
            let mut shared = self.view.shared.lock();
            shared.attributes = Some(ctx.attributes);
            shared.media = ctx.attributes.media;
            shared.phase = SessionPhase::Opened;
        }
        *self.view.events.lock() = Some(Arc::clone(&ctx.events));
        debug!(
            "session {} opened for {} with {} modifiers",
            self.view.id,
            ctx.attributes.class(),
            ctx.modifiers.len()
        );
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), SessionError> {
        self.faults.check(SessionOp::Prepare)?;
        self.expect_phase(
            "prepare",
            &[SessionPhase::Opened, SessionPhase::Prepared, SessionPhase::Stopped],
        )?;
        self.view.shared.lock().phase = SessionPhase::Prepared;
        Ok(())
    }

    fn start(&mut self) -> Result<(), SessionError> {
        self.faults.check(SessionOp::Start)?;
        self.expect_phase("start", &[SessionPhase::Prepared])?;
        let mut shared = self.view.shared.lock();
        shared.phase = SessionPhase::Running;
        shared.paused = false;
        shared.started_at = Some(Utc::now());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SessionError> {
        self.faults.check(SessionOp::Stop)?;
        self.expect_phase("stop", &[SessionPhase::Running])?;
        let mut shared = self.view.shared.lock();
        shared.phase = SessionPhase::Stopped;
        shared.started_at = None;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.faults.check(SessionOp::Close)?;
        let mut shared = self.view.shared.lock();
        if shared.phase == SessionPhase::Closed {
            return Err(SessionError::new(-77, "session already closed"));
        }
        shared.phase = SessionPhase::Closed;
        shared.connected.clear();
        shared.queue.reset();
        drop(shared);
        *self.view.events.lock() = None;
        info!("session {} closed", self.view.id);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SessionError> {
        self.faults.check(SessionOp::Read)?;
        self.expect_phase("read", &[SessionPhase::Running])?;
        let mut shared = self.view.shared.lock();
        let copied = shared.queue.read_into(buf);
        buf[copied..].fill(0);
        if shared.muted || shared.paused {
            buf.fill(0);
        }
        shared.bytes_read += buf.len() as u64;
        Ok(buf.len())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, SessionError> {
        self.faults.check(SessionOp::Write)?;
        self.expect_phase(
            "write",
            &[SessionPhase::Prepared, SessionPhase::Running],
        )?;
        let mut shared = self.view.shared.lock();
        let dropped = if shared.muted {
            shared.queue.write(&vec![0; buf.len()])
        } else {
            shared.queue.write(buf)
        };
        if dropped > 0 {
            debug!("session {}: queue overflow dropped {} bytes", self.view.id, dropped);
        }
        shared.bytes_written += buf.len() as u64;
        Ok(buf.len())
    }

    fn set_config(&mut self, config: &SessionConfig) -> Result<(), SessionError> {
        self.faults.check(SessionOp::SetConfig)?;
        if let SessionConfig::Connect(devices) = config {
            for device in devices {
                self.faults.check_device(device.id)?;
            }
        }
        let mut shared = self.view.shared.lock();
        match config {
            SessionConfig::MediaFormat(media) => shared.media = *media,
            SessionConfig::Connect(devices) => {
                for device in devices {
                    if !shared.connected.contains(&device.id) {
                        shared.connected.push(device.id);
                    }
                }
            }
            SessionConfig::Disconnect(devices) => {
                shared.connected.retain(|id| devices.iter().all(|d| d.id != *id));
            }
            SessionConfig::Volume(volume) => shared.volume = Some(volume.clone()),
            SessionConfig::Mute(muted) => shared.muted = *muted,
            SessionConfig::Pause => shared.paused = true,
            SessionConfig::Resume => shared.paused = false,
            SessionConfig::Effect { effect, enable } => {
                shared.effects.retain(|e| e != effect);
                if *enable {
                    shared.effects.push(*effect);
                }
            }
        }
        Ok(())
    }

    fn set_parameters(&mut self, param_id: u32, payload: &[u8]) -> Result<(), SessionError> {
        self.faults.check(SessionOp::SetParameters)?;
        self.view.shared.lock().params.insert(param_id, payload.to_vec());
        Ok(())
    }

    fn drain(&mut self, drain: DrainType) -> Result<(), SessionError> {
        self.expect_phase("drain", &[SessionPhase::Running])?;
        let event = {
            let mut shared = self.view.shared.lock();
            match drain {
                DrainType::Full => {
                    let count = shared.queue.count();
                    shared.queue.discard(count);
                    StreamEvent::DrainReady
                }
                DrainType::Partial => {
                    let half = shared.queue.count() / 2;
                    shared.queue.discard(half);
                    StreamEvent::PartialDrainReady
                }
            }
        };
        self.emit(event);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SessionError> {
        self.expect_phase("flush", &[SessionPhase::Running, SessionPhase::Stopped])?;
        self.view.shared.lock().queue.reset();
        Ok(())
    }

    fn set_buffer_size(
        &mut self,
        input: Option<BufferConfig>,
        output: Option<BufferConfig>,
    ) -> Result<(Option<BufferConfig>, Option<BufferConfig>), SessionError> {
        let mut shared = self.view.shared.lock();
        let frame = shared.media.frame_size().max(1);
        // Buffers are rounded up to whole frames.
        let round = |config: BufferConfig| BufferConfig {
            size: config.size.div_ceil(frame) * frame,
            count: config.count,
        };
        let input = input.map(round);
        let output = output.map(round);
        let depth = input
            .iter()
            .chain(output.iter())
            .map(|c| c.size * c.count)
            .max()
            .unwrap_or(DEFAULT_QUEUE_BYTES);
        shared.queue = RingBuffer::new(depth);
        Ok((input, output))
    }

    fn timestamp(&mut self) -> Result<SessionTime, SessionError> {
        let shared = self.view.shared.lock();
        let rate = u64::from(shared.media.sample_rate.max(1));
        let frames = Self::frames(&shared.media, shared.bytes_written.max(shared.bytes_read));
        let now = Utc::now().timestamp_micros().max(0) as u64;
        Ok(SessionTime {
            session_time_us: frames * 1_000_000 / rate,
            absolute_time_us: now,
            timestamp_us: now,
        })
    }

    fn create_mmap_buffer(&mut self, min_size_frames: u32) -> Result<MmapBuffer, SessionError> {
        self.expect_phase("create mmap buffer", &[SessionPhase::Opened, SessionPhase::Stopped])?;
        let mut shared = self.view.shared.lock();
        // 5 ms bursts.
        let burst = (shared.media.sample_rate / 200).max(1);
        let buffer = MmapBuffer {
            buffer_size_frames: min_size_frames.div_ceil(burst) * burst,
            burst_size_frames: burst,
        };
        shared.mmap = Some(buffer);
        Ok(buffer)
    }

    fn mmap_position(&mut self) -> Result<MmapPosition, SessionError> {
        let shared = self.view.shared.lock();
        if shared.mmap.is_none() {
            return Err(SessionError::new(-38, "no mmap buffer"));
        }
        let now = Utc::now();
        let position_frames = shared
            .started_at
            .map(|start| {
                let elapsed_us = (now - start).num_microseconds().unwrap_or(i64::MAX);
                elapsed_us.saturating_mul(i64::from(shared.media.sample_rate)) / 1_000_000
            })
            .unwrap_or(0);
        Ok(MmapPosition {
            position_frames,
            time_ns: now.timestamp_nanos_opt().unwrap_or(i64::MAX),
        })
    }
}

/// Creates [`MemorySession`]s that share one [`FaultPlan`].
#[derive(Default)]
pub struct MemorySessionFactory {
    faults: FaultPlan,
    sessions: Mutex<Vec<SessionView>>,
}

impl MemorySessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: FaultPlan) -> Self {
        Self {
            faults,
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Views of every session created so far, oldest first.
    pub fn sessions(&self) -> Vec<SessionView> {
        self.sessions.lock().clone()
    }

    pub fn last_session(&self) -> Option<SessionView> {
        self.sessions.lock().last().cloned()
    }

    /// Sessions not yet closed.
    pub fn live_sessions(&self) -> usize {
        self.sessions
            .lock()
            .iter()
            .filter(|p| p.phase() != SessionPhase::Closed)
            .count()
    }
}

impl SessionFactory for MemorySessionFactory {
    fn make_session(&self, attributes: &StreamAttributes) -> Result<Box<dyn Session>, SessionError> {
        self.faults.check(SessionOp::Create)?;
        let session = MemorySession::new(self.faults.clone());
        debug!("session {} created for {}", session.view.id, attributes.class());
        self.sessions.lock().push(session.view());
        Ok(Box::new(session))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
