pub mod log;
pub mod session;

pub use log::{LogEntry, LogLevel};
pub use session::{SessionDebug, SessionEnd, SessionStart, SessionSummary};

/// Per-event schema version. Bumped when an individual event shape changes.
pub const SCHEMA_VERSION: u32 = 1;

/// NDJSON contract version. Bumped only on breaking changes to the overall
/// event stream shape, independently of per-event schema versions.
pub const CONTRACT_VERSION: u32 = 1;
