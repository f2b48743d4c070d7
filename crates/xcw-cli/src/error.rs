use std::fmt;

/// A terminal CLI failure. By the time one of these propagates to `main`
/// the matching `error` event has already been emitted, so `main` only
/// maps it to an exit code.
#[derive(Debug)]
pub struct CliError {
    pub code: String,
    pub message: String,
    pub hint: Option<String>,
    exit: i32,
}

impl CliError {
    /// Fatal error: exit 1.
    pub fn fatal(code: &str, message: impl Into<String>) -> Self {
        CliError {
            code: code.to_string(),
            message: message.into(),
            hint: None,
            exit: 1,
        }
    }

    /// Invalid flag combination: exit 2.
    pub fn flags(message: impl Into<String>) -> Self {
        CliError {
            code: "INVALID_FLAGS".to_string(),
            message: message.into(),
            hint: None,
            exit: 2,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn exit_code(&self) -> i32 {
        self.exit
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for CliError {}
