mod hints;
mod orchestrator;

pub use hints::default_hints;
pub use orchestrator::{EndReason, Tail, TailConfig, TailOutcome};
