pub mod emitter;
pub mod events;
pub mod patterns;
pub mod rotation;

pub use emitter::{Emitter, OutputFormat};
pub use events::*;
pub use patterns::{EnhancedPatternMatch, LearnedPattern, PatternMatch, PatternStore};
