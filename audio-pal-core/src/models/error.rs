use thiserror::Error;

/// Opaque failure reported by a session back-end.
///
/// The core never interprets `code`; it is handed back to the caller as the
/// operation status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("session error {code}: {message}")]
pub struct SessionError {
    pub code: i32,
    pub message: String,
}

impl SessionError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returned by back-ends for optional operations they do not implement.
    pub fn unsupported(operation: &str) -> Self {
        Self::new(-95, format!("{} not supported by this back-end", operation))
    }
}

/// Errors returned by every platform-layer operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PalError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("device config error: {0}")]
    DeviceConfig(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl PalError {
    /// Negative errno-style status for the API boundary.
    pub fn status(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => -22,
            Self::InvalidState(_) => -77,
            Self::ResourceUnavailable(_) => -6,
            Self::DeviceConfig(_) => -19,
            Self::Session(e) => e.code,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }

    pub fn is_device_config(&self) -> bool {
        matches!(self, Self::DeviceConfig(_))
    }
}

pub type Result<T> = std::result::Result<T, PalError>;
