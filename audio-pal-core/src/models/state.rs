/// Stream lifecycle state machine.
///
/// State transitions:
/// ```text
/// idle → opened → started ↔ paused
///                   ↓  ↑      ↓
///                  stopped ←──┘
/// any non-closed state → closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Idle,
    Opened,
    Started,
    Paused,
    Stopped,
    Closed,
}

impl StreamState {
    /// Started or paused: the stream is counted in the concurrency state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Started | Self::Paused)
    }

    /// A session exists and runtime controls may be applied.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Self::Opened | Self::Started | Self::Paused | Self::Stopped
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn can_start(&self) -> bool {
        matches!(self, Self::Opened | Self::Stopped)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Opened => "opened",
            Self::Started => "started",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
