mod analyze;
mod query;
mod replay;

pub use analyze::{analyze, AnalyzeOptions};
pub use query::{query, QueryOptions};
pub use replay::{replay, ReplayOptions};
