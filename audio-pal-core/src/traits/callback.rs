use crate::models::events::{GlobalEvent, StreamEvent};
use crate::stream::StreamId;

/// Per-stream event receiver registered at open.
///
/// Called from whichever thread the session reports on; implementations
/// marshal elsewhere if needed.
pub trait StreamCallback: Send + Sync {
    fn on_event(&self, stream: StreamId, event: &StreamEvent);
}

/// Process-wide event receiver. The resource manager keeps only a weak
/// reference to it.
pub trait GlobalCallback: Send + Sync {
    /// `cookie` is the value supplied at registration.
    fn on_global_event(&self, event: &GlobalEvent, cookie: u64);
}
