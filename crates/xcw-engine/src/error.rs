use std::fmt;

/// Result type for xcw-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the engine layer
#[derive(Debug)]
pub enum Error {
    /// WHERE clause could not be parsed (missing operator, empty side,
    /// operator not valid for the field)
    InvalidWhere(String),

    /// Regex inside a WHERE clause failed to compile
    InvalidWhereRegex { clause: String, source: regex::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidWhere(msg) => write!(f, "invalid where clause: {}", msg),
            Error::InvalidWhereRegex { clause, source } => {
                write!(f, "invalid regex in where clause '{}': {}", clause, source)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidWhereRegex { source, .. } => Some(source),
            Error::InvalidWhere(_) => None,
        }
    }
}
