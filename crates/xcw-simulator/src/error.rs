use std::fmt;

/// Result type for xcw-simulator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the simulator layer
#[derive(Debug)]
pub enum Error {
    /// IO operation failed (spawning or talking to a subprocess)
    Io(std::io::Error),

    /// Device listing JSON could not be parsed
    Json(serde_json::Error),

    /// No device matched the requested name or UDID
    DeviceNotFound(String),

    /// "booted" was requested but no simulator is booted
    NoBootedSimulator,

    /// The log stream subprocess could not be started
    Spawn(String),
}

impl Error {
    /// Stable machine-readable code for the NDJSON `error` event.
    pub fn code(&self) -> &'static str {
        match self {
            Error::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Error::NoBootedSimulator => "NO_BOOTED_SIMULATOR",
            Error::Spawn(_) | Error::Io(_) | Error::Json(_) => "STREAM_FAILED",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Json(err) => write!(f, "device list parse error: {}", err),
            Error::DeviceNotFound(query) => write!(f, "simulator not found: {}", query),
            Error::NoBootedSimulator => write!(f, "no booted simulator"),
            Error::Spawn(msg) => write!(f, "failed to start log stream: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::DeviceNotFound(_) | Error::NoBootedSimulator | Error::Spawn(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
