use std::sync::Arc;

use crate::models::error::SessionError;

/// Callback invoked with `true` when the sound card comes online and `false`
/// when it goes away.
pub type CardStateCallback = Arc<dyn Fn(bool) + Send + Sync + 'static>;

/// Watches the underlying sound card / DSP connectivity.
pub trait DeviceMonitor: Send + Sync {
    /// Begin delivering card state changes to `callback`.
    fn start(&mut self, callback: CardStateCallback) -> Result<(), SessionError>;

    /// Stop delivering events. Must be safe to call when not started.
    fn stop(&mut self);

    /// Whether the card is currently usable.
    fn is_online(&self) -> bool;
}
