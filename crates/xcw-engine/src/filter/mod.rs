mod dedupe;
mod where_clause;

pub use dedupe::{DedupeFilter, DedupeMode, DedupeVerdict};
pub use where_clause::{WhereClause, WhereFilter};

use regex::Regex;
use xcw_types::LogEntry;

/// Fixed-order filter chain: include pattern, exclude patterns, WHERE
/// conjunction. Deduplication runs after the pipeline and is owned
/// separately by the orchestrator.
///
/// An empty pipeline admits everything.
#[derive(Debug, Default)]
pub struct Pipeline {
    pattern: Option<Regex>,
    excludes: Vec<Regex>,
    where_filter: Option<WhereFilter>,
}

impl Pipeline {
    pub fn new(
        pattern: Option<Regex>,
        excludes: Vec<Regex>,
        where_filter: Option<WhereFilter>,
    ) -> Self {
        Pipeline {
            pattern,
            excludes,
            where_filter,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_none() && self.excludes.is_empty() && self.where_filter.is_none()
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(&entry.message) {
                return false;
            }
        }

        for exclude in &self.excludes {
            if exclude.is_match(&entry.message) {
                return false;
            }
        }

        if let Some(where_filter) = &self.where_filter {
            if !where_filter.matches(entry) {
                return false;
            }
        }

        true
    }
}
