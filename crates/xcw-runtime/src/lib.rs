pub mod config;
pub mod ops;
pub mod resume;
pub mod tail;
pub mod trigger;

pub use config::{Config, Defaults};
pub use ops::{analyze, query, replay, AnalyzeOptions, QueryOptions, ReplayOptions};
pub use resume::{default_resume_path, load_resume_state, save_resume_state, ResumeState};
pub use tail::{default_hints, EndReason, Tail, TailConfig, TailOutcome};
pub use trigger::{TriggerConfig, TriggerExecutor, TriggerOutput};
