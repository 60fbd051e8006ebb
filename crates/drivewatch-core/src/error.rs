/// Error taxonomy for drive discovery and watching.
///
/// [`ResolveError`] describes why a single device or folder could not be
/// opened. It is never fatal: the device is logged and left out of the
/// registry. [`DriveError`] covers the remaining crate-level failures.
use thiserror::Error;

/// Failure opening a folder, a drive root, or a device root.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("access denied: {0}")]
    Unauthorized(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl ResolveError {
    /// Map an I/O error raised while opening `target`.
    pub fn from_io(target: &str, err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::PermissionDenied => Self::Unauthorized(target.to_owned()),
            ErrorKind::NotFound => Self::NotFound(target.to_owned()),
            ErrorKind::InvalidInput => Self::InvalidArgument(target.to_owned()),
            _ => Self::Other(format!("{target}: {err}")),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

#[derive(Debug, Error)]
pub enum DriveError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("device lookup failed: {0}")]
    LookupFailure(String),

    #[error("change listener is not attached yet")]
    DeliveryNotReady,

    #[error("event channel closed")]
    ChannelClosed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DriveError>;
