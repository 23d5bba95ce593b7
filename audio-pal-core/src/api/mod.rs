//! Handle-based entry points.
//!
//! [`Pal`] is what clients hold. Every per-stream call resolves its
//! [`StreamHandle`] first and fails with invalid-argument on a null or stale
//! handle before touching any shared state.

use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::RwLock;

use crate::manager::{instance, ResourceManager};
use crate::models::controls::{
    AudioEffect, BufferConfig, DrainType, MmapBuffer, MmapPosition, SessionTime, VolumeData,
};
use crate::models::device::{DeviceId, PalDevice};
use crate::models::error::Result;
use crate::models::params::ParamQualifier;
use crate::models::stream_attributes::{ModifierKv, StreamAttributes, StreamType};
use crate::stream::handle::StreamArena;
use crate::stream::{Stream, StreamHandle};
use crate::traits::callback::{GlobalCallback, StreamCallback};

/// Selects the read or write half of [`Pal::gef_rw_param`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GefAccess {
    Read,
    Write,
}

pub struct Pal {
    manager: Arc<ResourceManager>,
    streams: RwLock<StreamArena>,
}

impl Pal {
    /// Installs (or reuses) the process-wide resource manager and returns a
    /// facade over it.
    pub fn init<F>(build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<ResourceManager>,
    {
        let manager = instance::get_or_init(build).map_err(|e| {
            error!("platform init failed: {}", e);
            e
        })?;
        Ok(Self::from_manager(manager))
    }

    /// Facade over an explicitly constructed manager.
    pub fn from_manager(manager: Arc<ResourceManager>) -> Self {
        Self {
            manager,
            streams: RwLock::new(StreamArena::new()),
        }
    }

    pub fn manager(&self) -> &Arc<ResourceManager> {
        &self.manager
    }

    /// Stops monitoring and, if this facade's manager is the process-wide
    /// one, releases the slot. Streams still open are not closed.
    pub fn deinit(&self) {
        let outstanding = self.streams.read().len();
        if outstanding > 0 {
            warn!("deinit with {} streams still open", outstanding);
        }
        self.manager.deinit();
        if let Ok(installed) = instance::get_instance() {
            if Arc::ptr_eq(&installed, &self.manager) {
                instance::release();
            }
        }
    }

    /// Creates and opens a stream. On failure the half-built stream is
    /// closed and no handle is issued.
    pub fn stream_open(
        &self,
        attributes: Option<&StreamAttributes>,
        devices: &[PalDevice],
        modifiers: &[ModifierKv],
        callback: Option<Arc<dyn StreamCallback>>,
    ) -> Result<StreamHandle> {
        let stream = Stream::create(&self.manager, attributes, devices, modifiers).map_err(|e| {
            error!("stream create failed: {}", e);
            e
        })?;
        if let Some(callback) = callback {
            stream.register_callback(callback);
        }
        if let Err(e) = stream.open() {
            if let Err(close_err) = stream.close() {
                error!("closing stream {} after failed open: {}", stream.id(), close_err);
            }
            return Err(e);
        }
        let handle = self.streams.write().insert(Arc::clone(&stream))?;
        info!("stream {} opened as handle {:#x}", stream.id(), handle.to_raw());
        Ok(handle)
    }

    /// Closes the stream and invalidates `handle`.
    pub fn stream_close(&self, handle: StreamHandle) -> Result<()> {
        let stream = self.streams.write().remove(handle)?;
        debug!("closing handle {:#x}", handle.to_raw());
        stream.close()
    }

    pub fn stream_start(&self, handle: StreamHandle) -> Result<()> {
        self.stream(handle)?.start()
    }

    pub fn stream_stop(&self, handle: StreamHandle) -> Result<()> {
        self.stream(handle)?.stop()
    }

    pub fn stream_read(&self, handle: StreamHandle, buf: &mut [u8]) -> Result<usize> {
        self.stream(handle)?.read(buf)
    }

    pub fn stream_write(&self, handle: StreamHandle, buf: &[u8]) -> Result<usize> {
        self.stream(handle)?.write(buf)
    }

    pub fn stream_get_param(&self, handle: StreamHandle, param_id: u32) -> Result<Vec<u8>> {
        self.stream(handle)?.get_parameters(param_id)
    }

    pub fn stream_set_param(&self, handle: StreamHandle, param_id: u32, payload: &[u8]) -> Result<()> {
        self.stream(handle)?.set_parameters(param_id, payload)
    }

    pub fn stream_set_volume(&self, handle: StreamHandle, volume: &VolumeData) -> Result<()> {
        self.stream(handle)?.set_volume(volume)
    }

    pub fn stream_set_mute(&self, handle: StreamHandle, mute: bool) -> Result<()> {
        self.stream(handle)?.set_mute(mute)
    }

    pub fn stream_pause(&self, handle: StreamHandle) -> Result<()> {
        self.stream(handle)?.pause()
    }

    pub fn stream_resume(&self, handle: StreamHandle) -> Result<()> {
        self.stream(handle)?.resume()
    }

    pub fn stream_drain(&self, handle: StreamHandle, drain: DrainType) -> Result<()> {
        self.stream(handle)?.drain(drain)
    }

    pub fn stream_flush(&self, handle: StreamHandle) -> Result<()> {
        self.stream(handle)?.flush()
    }

    pub fn stream_set_buffer_size(
        &self,
        handle: StreamHandle,
        input: Option<BufferConfig>,
        output: Option<BufferConfig>,
    ) -> Result<(Option<BufferConfig>, Option<BufferConfig>)> {
        self.stream(handle)?.set_buffer_size(input, output)
    }

    pub fn get_timestamp(&self, handle: StreamHandle) -> Result<SessionTime> {
        self.stream(handle)?.get_timestamp()
    }

    pub fn add_remove_effect(&self, handle: StreamHandle, effect: AudioEffect, enable: bool) -> Result<()> {
        self.stream(handle)?.add_remove_effect(effect, enable)
    }

    /// Reroutes the stream; the whole device list is validated before any
    /// routing changes.
    pub fn stream_set_device(&self, handle: StreamHandle, devices: &[PalDevice]) -> Result<()> {
        self.stream(handle)?.switch_device(devices)
    }

    pub fn stream_get_mmap_position(&self, handle: StreamHandle) -> Result<MmapPosition> {
        self.stream(handle)?.get_mmap_position()
    }

    pub fn stream_create_mmap_buffer(&self, handle: StreamHandle, min_size_frames: u32) -> Result<MmapBuffer> {
        self.stream(handle)?.create_mmap_buffer(min_size_frames)
    }

    pub fn set_param(&self, param_id: u32, payload: &[u8]) -> Result<()> {
        self.manager.set_parameter(param_id, payload, None)
    }

    pub fn get_param(&self, param_id: u32) -> Result<Vec<u8>> {
        self.manager.get_parameter(param_id, None)
    }

    pub fn register_global_callback(&self, callback: &Arc<dyn GlobalCallback>, cookie: u64) {
        self.manager.register_global_callback(callback, cookie);
    }

    /// Reads into or writes from `payload` a parameter scoped to `device`
    /// and `stream_type`.
    pub fn gef_rw_param(
        &self,
        param_id: u32,
        payload: &mut Vec<u8>,
        device: DeviceId,
        stream_type: StreamType,
        access: GefAccess,
    ) -> Result<()> {
        let qualifier = Some(ParamQualifier {
            device,
            stream_type,
        });
        let result = match access {
            GefAccess::Write => self.manager.set_parameter(param_id, payload.as_slice(), qualifier),
            GefAccess::Read => self
                .manager
                .get_parameter(param_id, qualifier)
                .map(|bytes| *payload = bytes),
        };
        if let Err(e) = &result {
            error!("{:?} of parameter {:#x} failed: {}", access, param_id, e);
        }
        result
    }

    /// Number of streams with a live handle.
    pub fn open_streams(&self) -> usize {
        self.streams.read().len()
    }

    fn stream(&self, handle: StreamHandle) -> Result<Arc<Stream>> {
        self.streams.read().get(handle).map_err(|e| {
            error!("{}", e);
            e
        })
    }
}
