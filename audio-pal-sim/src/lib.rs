//! # audio-pal-sim
//!
//! In-memory execution back-end for audio-pal-core.
//!
//! Provides:
//! - `MemorySession` / `MemorySessionFactory`: loopback session graphs over a
//!   byte ring buffer, observable through `SessionView`
//! - `FaultPlan`: shared failure injection for every session operation and
//!   per-device connection refusal
//! - `ManualMonitor`: a `DeviceMonitor` whose sound-card state is driven by
//!   the caller
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use audio_pal_core::{Pal, PalConfig, ResourceManager};
//! use audio_pal_sim::{ManualMonitor, MemorySessionFactory};
//!
//! let factory = Arc::new(MemorySessionFactory::new());
//! let manager = ResourceManager::new(&PalConfig::default(), factory, Box::new(ManualMonitor::new()))?;
//! let pal = Pal::from_manager(Arc::new(manager));
//! ```

pub mod faults;
pub mod memory_session;
pub mod monitor;
pub mod ring_buffer;

pub use faults::{FaultPlan, SessionOp, INJECTED_FAULT};
pub use memory_session::{MemorySession, MemorySessionFactory, SessionPhase, SessionView};
pub use monitor::ManualMonitor;
pub use ring_buffer::RingBuffer;
