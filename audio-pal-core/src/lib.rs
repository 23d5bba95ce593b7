//! # audio-pal-core
//!
//! Concurrent stream arbitration and device routing for an audio platform
//! abstraction layer.
//!
//! Clients open streams through [`Pal`]. Each [`Stream`] runs its own
//! lifecycle and delegates data transfer to a back-end [`Session`]; the
//! [`ResourceManager`] decides which devices each stream is routed to, keeps
//! per-class activity counts, and applies the concurrency policy between
//! stream classes. Execution back-ends implement `SessionFactory` and plug in
//! at manager construction.
//!
//! ## Architecture
//!
//! ```text
//! audio-pal-core (this crate)
//! ├── api/       ← Pal facade, generational stream handles
//! ├── manager/   ← ResourceManager: routing, arbitration, global params, instance slot
//! ├── stream/    ← Stream state machine, runtime controls, handle arena
//! ├── routing/   ← DeviceTable, ConcurrencyState, ConcurrencyPolicy
//! ├── traits/    ← Session, SessionFactory, DeviceMonitor, callbacks
//! └── models/    ← PalError, StreamState, StreamAttributes, devices, params, config
//! ```

pub mod api;
pub mod manager;
pub mod models;
pub mod routing;
pub mod stream;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use api::{GefAccess, Pal};
pub use manager::ResourceManager;
pub use models::config::PalConfig;
pub use models::controls::{AudioEffect, BufferConfig, DrainType, MmapBuffer, MmapPosition, SessionTime, VolumeData};
pub use models::device::{DeviceId, DeviceInfo, PalDevice};
pub use models::error::{PalError, Result, SessionError};
pub use models::events::{GlobalEvent, StreamEvent};
pub use models::params::{GlobalParam, ParamId, ParamQualifier};
pub use models::state::StreamState;
pub use models::stream_attributes::{MediaConfig, ModifierKv, StreamAttributes, StreamClass, StreamDirection, StreamType};
pub use routing::policy::{PolicyAction, PolicyDecision, PolicyRule};
pub use stream::{Stream, StreamHandle, StreamId};
pub use traits::callback::{GlobalCallback, StreamCallback};
pub use traits::monitor::{CardStateCallback, DeviceMonitor};
pub use traits::session::{Session, SessionConfig, SessionContext, SessionEventSink, SessionFactory};
