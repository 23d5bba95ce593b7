//! Process-wide resource manager slot.
//!
//! Sessions and back-end code that have no handle to the manager reach it
//! through here. The slot holds at most one manager; [`get_or_init`] creates
//! it on first use and [`release`] empties it.

use std::sync::Arc;

use log::{error, info};
use parking_lot::Mutex;

use super::ResourceManager;
use crate::models::error::{PalError, Result};
use crate::models::stream_attributes::StreamClass;

static INSTANCE: Mutex<Option<Arc<ResourceManager>>> = parking_lot::const_mutex(None);

/// Returns the installed manager, building and initializing it with `build`
/// if the slot is empty. Concurrent callers observe a single manager.
pub fn get_or_init<F>(build: F) -> Result<Arc<ResourceManager>>
where
    F: FnOnce() -> Result<ResourceManager>,
{
    let mut slot = INSTANCE.lock();
    if let Some(manager) = slot.as_ref() {
        return Ok(Arc::clone(manager));
    }
    let manager = Arc::new(build()?);
    manager.init()?;
    info!("process-wide resource manager installed");
    *slot = Some(Arc::clone(&manager));
    Ok(manager)
}

/// The installed manager.
pub fn get_instance() -> Result<Arc<ResourceManager>> {
    INSTANCE
        .lock()
        .as_ref()
        .cloned()
        .ok_or_else(|| PalError::ResourceUnavailable("no resource manager installed".into()))
}

/// Deinitializes and removes the installed manager. Streams still holding it
/// keep it alive until they are closed.
pub fn release() {
    let taken = INSTANCE.lock().take();
    if let Some(manager) = taken {
        manager.deinit();
        info!("process-wide resource manager released");
    }
}

/// Forwards a concurrency notification to the installed manager.
pub fn notify_concurrent_stream(class: StreamClass, active: bool) {
    match get_instance() {
        Ok(manager) => {
            manager.concurrent_stream_status(class, active);
        }
        Err(_) => error!("concurrency notification for {} with no resource manager", class),
    }
}
