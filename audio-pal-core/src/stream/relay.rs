//! Session event delivery.
//!
//! Sessions may raise events synchronously from inside a call the core made
//! while holding a stream or manager lock. Such events are queued while any
//! [`RelayHold`] on the stream is alive and delivered when the last hold is
//! released, after the caller has let go of its locks.

use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};

use super::StreamId;
use crate::models::events::StreamEvent;
use crate::traits::callback::StreamCallback;
use crate::traits::session::SessionEventSink;

#[derive(Default)]
struct Gate {
    holds: usize,
    pending: Vec<StreamEvent>,
}

pub(crate) struct EventRelay {
    stream: StreamId,
    callback: RwLock<Option<Arc<dyn StreamCallback>>>,
    gate: Mutex<Gate>,
}

impl EventRelay {
    pub(crate) fn new(stream: StreamId) -> Arc<Self> {
        Arc::new(Self {
            stream,
            callback: RwLock::new(None),
            gate: Mutex::new(Gate::default()),
        })
    }

    pub(crate) fn register(&self, callback: Arc<dyn StreamCallback>) {
        *self.callback.write() = Some(callback);
    }

    /// Defers delivery until the returned hold (and every other hold taken
    /// meanwhile) is dropped.
    pub(crate) fn hold(self: &Arc<Self>) -> RelayHold {
        self.gate.lock().holds += 1;
        RelayHold(Arc::clone(self))
    }

    pub(crate) fn sink(self: &Arc<Self>) -> SessionEventSink {
        let relay = Arc::clone(self);
        Arc::new(move |event: StreamEvent| relay.raise(event))
    }

    fn raise(&self, event: StreamEvent) {
        {
            let mut gate = self.gate.lock();
            if gate.holds > 0 {
                debug!("stream {}: deferring {:?}", self.stream, event);
                gate.pending.push(event);
                return;
            }
        }
        self.deliver(&event);
    }

    fn release(&self) {
        let pending = {
            let mut gate = self.gate.lock();
            gate.holds = gate.holds.saturating_sub(1);
            if gate.holds > 0 {
                return;
            }
            std::mem::take(&mut gate.pending)
        };
        for event in &pending {
            self.deliver(event);
        }
    }

    fn deliver(&self, event: &StreamEvent) {
        let callback = self.callback.read().clone();
        match callback {
            Some(callback) => callback.on_event(self.stream, event),
            None => debug!("stream {}: no callback for {:?}", self.stream, event),
        }
    }
}

/// Keeps a stream's session events queued while alive.
#[must_use]
pub(crate) struct RelayHold(Arc<EventRelay>);

impl Drop for RelayHold {
    fn drop(&mut self) {
        self.0.release();
    }
}
