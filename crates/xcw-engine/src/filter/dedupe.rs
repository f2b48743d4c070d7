use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How repeats are collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeMode {
    /// Suppress only identical back-to-back messages.
    Consecutive,
    /// Suppress any repeat seen within the sliding window.
    Windowed(Duration),
}

#[derive(Debug, Clone)]
struct SeenEntry {
    count: u64,
    first_seen: Instant,
    last_seen: Instant,
}

#[derive(Debug)]
struct DedupeState {
    seen: HashMap<String, SeenEntry>,
    last_message: Option<String>,
    suppressed: u64,
}

/// Outcome of a dedupe check.
#[derive(Debug, Clone, Copy)]
pub struct DedupeVerdict {
    pub emit: bool,
    /// Occurrence count including this one (1 = first).
    pub count: u64,
}

/// Collapses repeated identical messages. All access goes through an
/// internal mutex; the orchestrator drains suppression counts for
/// summaries from another context.
#[derive(Debug)]
pub struct DedupeFilter {
    mode: DedupeMode,
    state: Mutex<DedupeState>,
}

impl DedupeFilter {
    pub fn new(mode: DedupeMode) -> Self {
        DedupeFilter {
            mode,
            state: Mutex::new(DedupeState {
                seen: HashMap::new(),
                last_message: None,
                suppressed: 0,
            }),
        }
    }

    pub fn check(&self, message: &str) -> DedupeVerdict {
        self.check_at(message, Instant::now())
    }

    /// Clock-injected variant of [`check`](Self::check); windowed aging is
    /// evaluated against `now`.
    pub fn check_at(&self, message: &str, now: Instant) -> DedupeVerdict {
        let mut state = self.state.lock().unwrap();

        if let DedupeMode::Windowed(window) = self.mode {
            state
                .seen
                .retain(|_, entry| now.duration_since(entry.last_seen) < window);
        }

        if let Some(existing) = state.seen.get_mut(message) {
            existing.count += 1;
            existing.last_seen = now;
            let count = existing.count;

            let suppress = match self.mode {
                DedupeMode::Windowed(_) => true,
                DedupeMode::Consecutive => state.last_message.as_deref() == Some(message),
            };
            if suppress {
                state.suppressed += 1;
                return DedupeVerdict { emit: false, count };
            }
        }

        state.seen.insert(
            message.to_string(),
            SeenEntry {
                count: 1,
                first_seen: now,
                last_seen: now,
            },
        );
        state.last_message = Some(message.to_string());

        DedupeVerdict { emit: true, count: 1 }
    }

    /// Returns and resets the number of entries suppressed since the last
    /// call. Reported on the next summary.
    pub fn take_suppressed(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        std::mem::take(&mut state.suppressed)
    }

    /// Messages with more than one occurrence, for duplicate summaries.
    pub fn pending_duplicates(&self) -> Vec<(String, u64)> {
        let state = self.state.lock().unwrap();
        let mut pending: Vec<(String, u64)> = state
            .seen
            .iter()
            .filter(|(_, entry)| entry.count > 1)
            .map(|(message, entry)| (message.clone(), entry.count))
            .collect();
        pending.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        pending
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.seen.clear();
        state.last_message = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_suppresses_runs() {
        let filter = DedupeFilter::new(DedupeMode::Consecutive);

        let first = filter.check("repeated");
        assert!(first.emit);
        assert_eq!(first.count, 1);

        for expected in 2..=5 {
            let verdict = filter.check("repeated");
            assert!(!verdict.emit);
            assert_eq!(verdict.count, expected);
        }

        // A different message restarts the run tracker.
        assert!(filter.check("different").emit);
        assert!(filter.check("repeated").emit);

        assert_eq!(filter.take_suppressed(), 4);
        assert_eq!(filter.take_suppressed(), 0);
    }

    #[test]
    fn windowed_suppresses_non_consecutive_repeats() {
        let filter = DedupeFilter::new(DedupeMode::Windowed(Duration::from_secs(60)));
        let t0 = Instant::now();

        assert!(filter.check_at("a", t0).emit);
        assert!(filter.check_at("b", t0).emit);
        assert!(!filter.check_at("a", t0 + Duration::from_secs(1)).emit);
        assert!(!filter.check_at("b", t0 + Duration::from_secs(2)).emit);
    }

    #[test]
    fn windowed_entries_age_out() {
        let filter = DedupeFilter::new(DedupeMode::Windowed(Duration::from_secs(10)));
        let t0 = Instant::now();

        assert!(filter.check_at("a", t0).emit);
        assert!(!filter.check_at("a", t0 + Duration::from_secs(5)).emit);
        // Last occurrence was at t0+5s; by t0+16s it has aged out.
        assert!(filter.check_at("a", t0 + Duration::from_secs(16)).emit);
    }

    #[test]
    fn pending_duplicates_report_counts() {
        let filter = DedupeFilter::new(DedupeMode::Consecutive);
        for _ in 0..3 {
            filter.check("noisy");
        }
        filter.check("quiet");

        let pending = filter.pending_duplicates();
        assert_eq!(pending, vec![("noisy".to_string(), 3)]);
    }

    #[test]
    fn reset_clears_state() {
        let filter = DedupeFilter::new(DedupeMode::Consecutive);
        filter.check("x");
        filter.check("x");
        filter.reset();
        assert!(filter.check("x").emit);
    }
}
