use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

use audio_pal_core::models::error::SessionError;
use audio_pal_core::traits::monitor::{CardStateCallback, DeviceMonitor};

struct MonitorState {
    callback: Option<CardStateCallback>,
    online: bool,
    refuse_start: bool,
}

/// Sound-card monitor driven by the caller.
///
/// Clones share state: hand one clone to the resource manager and keep
/// another to flip the card online or offline.
#[derive(Clone)]
pub struct ManualMonitor(Arc<Mutex<MonitorState>>);

impl Default for ManualMonitor {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(MonitorState {
            callback: None,
            online: true,
            refuse_start: false,
        })))
    }
}

impl ManualMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `start` fail, as if the monitoring service were unreachable.
    pub fn refuse_start(&self, refuse: bool) {
        self.0.lock().refuse_start = refuse;
    }

    pub fn is_running(&self) -> bool {
        self.0.lock().callback.is_some()
    }

    /// Changes the card state and notifies the running subscriber.
    pub fn set_online(&self, online: bool) {
        let callback = {
            let mut state = self.0.lock();
            if state.online == online {
                return;
            }
            state.online = online;
            state.callback.clone()
        };
        info!("simulated sound card {}", if online { "online" } else { "offline" });
        if let Some(callback) = callback {
            callback(online);
        }
    }
}

impl DeviceMonitor for ManualMonitor {
    fn start(&mut self, callback: CardStateCallback) -> Result<(), SessionError> {
        let mut state = self.0.lock();
        if state.refuse_start {
            return Err(SessionError::new(-111, "sound card monitor refused connection"));
        }
        state.callback = Some(callback);
        debug!("manual monitor started");
        Ok(())
    }

    fn stop(&mut self) {
        if self.0.lock().callback.take().is_some() {
            debug!("manual monitor stopped");
        }
    }

    fn is_online(&self) -> bool {
        self.0.lock().online
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn only_changes_are_delivered() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = ManualMonitor::new();
        let mut monitor = handle.clone();
        monitor
            .start(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        handle.set_online(true);
        handle.set_online(false);
        handle.set_online(false);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!monitor.is_online());

        monitor.stop();
        handle.set_online(true);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!handle.is_running());
    }

    #[test]
    fn refused_start_reports_an_error() {
        let mut monitor = ManualMonitor::new();
        monitor.refuse_start(true);
        assert!(monitor.start(Arc::new(|_| {})).is_err());
        assert!(!monitor.is_running());
    }
}
