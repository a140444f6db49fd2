//! Error types shared by the blocking and async clients.

use thiserror::Error;

/// Caller mistakes. Raised before anything is sent and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("invalid command {0:?}, expected one of mow, pause, returnToDock")]
    InvalidCommand(String),
    #[error("invalid mow mode {0:?}, expected true or false")]
    InvalidMowMode(String),
    #[error("longpoll timeout {0}s out of range, must be between 1 and {max}s", max = crate::engine::MAX_LONGPOLL_TIMEOUT_SECS)]
    LongpollTimeout(u64),
    #[error("invalid calendar: {0}")]
    InvalidCalendar(String),
    #[error("alerts not loaded, call update_alerts first")]
    AlertsNotLoaded,
    #[error("wrong alert index {index}, there are {count} alerts")]
    AlertIndex { index: usize, count: usize },
    #[error("no map filename defined")]
    NoMapFilename,
    #[error("not authenticated, call login or start first")]
    NotAuthenticated,
    #[error("mower serial unknown, login did not discover a mower")]
    SerialUnknown,
    #[error("user id unknown for this session")]
    UserUnknown,
}

#[derive(Debug, Error)]
pub enum IndegoError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http {status} from {path}")]
    Http { status: u16, path: String },
    #[error("json error: {0}")]
    Json(#[from] serde_path_to_error::Error<serde_json::Error>),
    #[error("invalid response body from {path}: {message}")]
    InvalidBody { path: String, message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = IndegoError> = std::result::Result<T, E>;
