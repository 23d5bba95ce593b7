//! Process-wide arbiter of stream concurrency and device routing.
//!
//! Lock order: a stream's lifecycle lock, then the manager state lock, then a
//! stream's inner state lock. The manager never takes a lifecycle lock, and a
//! stream never calls into the manager while holding its inner lock.

mod arbitration;
mod globals;
pub mod instance;
mod routing;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::models::config::PalConfig;
use crate::models::device::{DeviceId, PalDevice};
use crate::models::error::{PalError, Result};
use crate::models::events::GlobalEvent;
use crate::models::stream_attributes::StreamClass;
use crate::routing::concurrency::ConcurrencyState;
use crate::routing::device_table::DeviceTable;
use crate::routing::policy::ConcurrencyPolicy;
use crate::stream::{Stream, StreamId};
use crate::traits::monitor::DeviceMonitor;
use crate::traits::session::SessionFactory;

pub use globals::GlobalSettings;

/// Weak registration of the process-wide event receiver.
struct GlobalCallbackSlot {
    callback: Weak<dyn crate::traits::callback::GlobalCallback>,
    cookie: u64,
}

/// A registered stream. The manager keeps only a weak reference; `counted`
/// mirrors whether the stream's class count includes it.
struct Registration {
    stream: Weak<Stream>,
    class: StreamClass,
    counted: Arc<AtomicBool>,
}

/// Everything guarded by the manager's single state lock.
struct ManagerState {
    initialized: bool,
    card_online: bool,
    concurrency: ConcurrencyState,
    streams: BTreeMap<StreamId, Registration>,
    bindings: BTreeMap<StreamId, Vec<PalDevice>>,
    disconnected: BTreeSet<DeviceId>,
    globals: GlobalSettings,
    global_callback: Option<GlobalCallbackSlot>,
}

impl ManagerState {
    /// Live registered streams. Registrations whose stream was dropped
    /// without closing are skipped.
    fn live_streams(&self) -> Vec<Arc<Stream>> {
        self.streams
            .values()
            .filter_map(|r| r.stream.upgrade())
            .collect()
    }

    /// Drops registrations whose stream is gone. A stream dropped while
    /// active also gives back its class count. Returns whether any count
    /// changed.
    fn prune_dead(&mut self) -> bool {
        let dead: Vec<StreamId> = self
            .streams
            .iter()
            .filter(|(_, r)| r.stream.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut released = false;
        for id in dead {
            let Some(registration) = self.streams.remove(&id) else {
                continue;
            };
            self.bindings.remove(&id);
            if registration.counted.swap(false, Ordering::AcqRel) {
                warn!(
                    "stream {} was dropped while active; releasing its {} count",
                    id, registration.class
                );
                self.concurrency.update(registration.class, false);
                released = true;
            } else {
                warn!("stream {} was dropped without close; releasing its registration", id);
            }
        }
        released
    }
}

/// Single authority for stream admission, device routing, and global
/// parameters.
///
/// Construct with [`ResourceManager::new`], then call [`ResourceManager::init`]
/// to start sound-card monitoring. See [`instance`] for the process-wide slot.
pub struct ResourceManager {
    table: DeviceTable,
    policy: ConcurrencyPolicy,
    factory: Arc<dyn SessionFactory>,
    monitor: Mutex<Box<dyn DeviceMonitor>>,
    next_stream_id: AtomicU64,
    state: RwLock<ManagerState>,
}

impl ResourceManager {
    pub fn new(
        config: &PalConfig,
        factory: Arc<dyn SessionFactory>,
        monitor: Box<dyn DeviceMonitor>,
    ) -> Result<Self> {
        let (table, policy) = config.build()?;
        info!(
            "resource manager created: {} devices, {} policy rules, back-end {}",
            table.device_ids().count(),
            policy.rules().len(),
            factory.name()
        );
        Ok(Self {
            table,
            policy,
            factory,
            monitor: Mutex::new(monitor),
            next_stream_id: AtomicU64::new(1),
            state: RwLock::new(ManagerState {
                initialized: false,
                card_online: true,
                concurrency: ConcurrencyState::new(),
                streams: BTreeMap::new(),
                bindings: BTreeMap::new(),
                disconnected: BTreeSet::new(),
                globals: GlobalSettings::new(config.voice_ui_device),
                global_callback: None,
            }),
        })
    }

    /// Starts sound-card monitoring. Calling it again once initialized is a
    /// no-op.
    pub fn init(self: &Arc<Self>) -> Result<()> {
        let mut monitor = self.monitor.lock();
        if self.state.read().initialized {
            debug!("resource manager already initialized");
            return Ok(());
        }

        let weak = Arc::downgrade(self);
        monitor
            .start(Arc::new(move |online| {
                if let Some(manager) = weak.upgrade() {
                    manager.on_card_state(online);
                }
            }))
            .map_err(|e| PalError::ResourceUnavailable(format!("sound card monitor: {}", e)))?;

        let online = monitor.is_online();
        {
            let mut state = self.state.write();
            state.initialized = true;
            state.card_online = online;
        }
        info!("resource manager initialized, sound card online: {}", online);
        Ok(())
    }

    /// Stops monitoring. Idempotent, and safe without a prior `init`.
    pub fn deinit(&self) {
        let mut monitor = self.monitor.lock();
        monitor.stop();
        let mut state = self.state.write();
        if state.initialized {
            info!("resource manager deinitialized");
        }
        state.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    pub fn is_card_online(&self) -> bool {
        self.state.read().card_online
    }

    pub(crate) fn session_factory(&self) -> &Arc<dyn SessionFactory> {
        &self.factory
    }

    pub fn device_table(&self) -> &DeviceTable {
        &self.table
    }

    pub fn policy(&self) -> &ConcurrencyPolicy {
        &self.policy
    }

    pub(crate) fn allocate_stream_id(&self) -> StreamId {
        StreamId(self.next_stream_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn register_stream(&self, stream: &Arc<Stream>) {
        let mut holds = Vec::new();
        let decisions = {
            let mut state = self.state.write();
            let decisions = if state.prune_dead() {
                self.reconcile(&state, &mut holds)
            } else {
                Vec::new()
            };
            state.streams.insert(
                stream.id(),
                Registration {
                    stream: Arc::downgrade(stream),
                    class: stream.attributes().class(),
                    counted: stream.activity_flag(),
                },
            );
            decisions
        };
        debug!("registered stream {} ({})", stream.id(), stream.attributes().class());
        self.publish(&decisions);
    }

    pub(crate) fn unregister_stream(&self, id: StreamId) {
        let mut state = self.state.write();
        state.streams.remove(&id);
        state.bindings.remove(&id);
        debug!("unregistered stream {}", id);
    }

    /// Number of streams currently registered.
    pub fn stream_count(&self) -> usize {
        self.state
            .read()
            .streams
            .values()
            .filter(|r| r.stream.strong_count() > 0)
            .count()
    }

    fn on_card_state(&self, online: bool) {
        {
            let mut state = self.state.write();
            if state.card_online == online {
                return;
            }
            state.card_online = online;
        }
        if online {
            info!("sound card online");
        } else {
            warn!("sound card offline; new streams will be refused");
        }
        self.emit(GlobalEvent::SoundCardState { online });
    }
}

#[cfg(test)]
pub(crate) mod testing;
