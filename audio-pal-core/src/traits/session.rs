use std::sync::Arc;

use crate::models::controls::{
    AudioEffect, BufferConfig, DrainType, MmapBuffer, MmapPosition, SessionTime, VolumeData,
};
use crate::models::device::PalDevice;
use crate::models::error::SessionError;
use crate::models::events::StreamEvent;
use crate::models::stream_attributes::{MediaConfig, ModifierKv, StreamAttributes};

/// Sink a session reports asynchronous stream events into.
///
/// May be invoked from a back-end thread; keep work minimal.
pub type SessionEventSink = Arc<dyn Fn(StreamEvent) + Send + Sync + 'static>;

/// Everything a session needs to build its graph.
#[derive(Clone)]
pub struct SessionContext {
    pub attributes: StreamAttributes,
    pub modifiers: Vec<ModifierKv>,
    pub events: SessionEventSink,
}

/// Session-scoped configuration pushed by the stream and resource manager.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionConfig {
    MediaFormat(MediaConfig),
    /// Attach the graph to these devices.
    Connect(Vec<PalDevice>),
    /// Detach the graph from these devices.
    Disconnect(Vec<PalDevice>),
    Volume(VolumeData),
    Mute(bool),
    Pause,
    Resume,
    Effect { effect: AudioEffect, enable: bool },
}

/// Execution back-end for one stream's audio graph.
///
/// The core only drives this lifecycle; failures are propagated to the
/// caller verbatim and never retried.
pub trait Session: Send {
    fn open(&mut self, ctx: &SessionContext) -> Result<(), SessionError>;

    fn prepare(&mut self) -> Result<(), SessionError>;

    /// Runs the prepared graph. A graph paused before its last stop
    /// restarts unpaused.
    fn start(&mut self) -> Result<(), SessionError>;

    fn stop(&mut self) -> Result<(), SessionError>;

    fn close(&mut self) -> Result<(), SessionError>;

    /// Returns the number of bytes read into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SessionError>;

    /// Returns the number of bytes consumed from `buf`.
    fn write(&mut self, buf: &[u8]) -> Result<usize, SessionError>;

    fn set_config(&mut self, config: &SessionConfig) -> Result<(), SessionError>;

    fn set_parameters(&mut self, param_id: u32, payload: &[u8]) -> Result<(), SessionError>;

    fn drain(&mut self, _drain: DrainType) -> Result<(), SessionError> {
        Err(SessionError::unsupported("drain"))
    }

    fn flush(&mut self) -> Result<(), SessionError> {
        Err(SessionError::unsupported("flush"))
    }

    /// Applies buffer geometry and returns what the back-end actually uses.
    fn set_buffer_size(
        &mut self,
        input: Option<BufferConfig>,
        output: Option<BufferConfig>,
    ) -> Result<(Option<BufferConfig>, Option<BufferConfig>), SessionError> {
        Ok((input, output))
    }

    fn timestamp(&mut self) -> Result<SessionTime, SessionError> {
        Err(SessionError::unsupported("timestamp"))
    }

    fn create_mmap_buffer(&mut self, _min_size_frames: u32) -> Result<MmapBuffer, SessionError> {
        Err(SessionError::unsupported("mmap buffer"))
    }

    fn mmap_position(&mut self) -> Result<MmapPosition, SessionError> {
        Err(SessionError::unsupported("mmap position"))
    }
}

/// Creates sessions for one execution back-end.
pub trait SessionFactory: Send + Sync {
    fn make_session(&self, attributes: &StreamAttributes) -> Result<Box<dyn Session>, SessionError>;

    /// Back-end name, for logs.
    fn name(&self) -> &str;
}
