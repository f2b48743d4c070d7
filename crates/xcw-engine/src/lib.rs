pub mod analysis;
pub mod error;
pub mod filter;
pub mod session;

pub use analysis::normalize_message;
pub use error::{Error, Result};
pub use filter::{DedupeFilter, DedupeMode, DedupeVerdict, Pipeline, WhereClause, WhereFilter};
pub use session::{SessionChange, Tracker};
