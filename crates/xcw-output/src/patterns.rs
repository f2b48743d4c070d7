use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pattern aggregated by the analyzer over one input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern: String,
    pub count: u64,
    pub samples: Vec<String>,
}

/// A [`PatternMatch`] enriched with what the persistent store knows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedPatternMatch {
    #[serde(flatten)]
    pub base: PatternMatch,
    pub is_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    pub total_count: u64,
}

/// One learned pattern as persisted on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub pattern: String,
    pub total_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PatternsFile {
    version: u32,
    #[serde(default)]
    patterns: Vec<LearnedPattern>,
}

const PATTERNS_FILE_VERSION: u32 = 1;

/// Persistent store of normalized pattern templates with frequency and
/// first/last-seen times. Safe for concurrent recording; persistence uses
/// the atomic temp-file-and-rename discipline.
pub struct PatternStore {
    path: PathBuf,
    patterns: Mutex<HashMap<String, LearnedPattern>>,
}

impl PatternStore {
    /// Opens the store at `path` (default `~/.xcw/patterns.json`) and
    /// loads what exists. A missing file is an empty store.
    pub fn new(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(default_patterns_path);
        let store = PatternStore {
            path,
            patterns: Mutex::new(HashMap::new()),
        };
        let _ = store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> std::io::Result<()> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };

        // Unknown top-level keys and future versions are tolerated; we
        // read whatever `patterns` we can.
        let file: PatternsFile = serde_json::from_str(&data).map_err(std::io::Error::other)?;
        let mut patterns = self.patterns.lock().unwrap();
        patterns.clear();
        for learned in file.patterns {
            patterns.insert(learned.pattern.clone(), learned);
        }
        Ok(())
    }

    pub fn save(&self) -> std::io::Result<()> {
        let snapshot: Vec<LearnedPattern> = {
            let patterns = self.patterns.lock().unwrap();
            let mut all: Vec<LearnedPattern> = patterns.values().cloned().collect();
            all.sort_by(|a, b| b.total_count.cmp(&a.total_count).then_with(|| a.pattern.cmp(&b.pattern)));
            all
        };

        let file = PatternsFile {
            version: PATTERNS_FILE_VERSION,
            patterns: snapshot,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let body = serde_json::to_string_pretty(&file).map_err(std::io::Error::other)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body.as_bytes())?;
        std::fs::rename(&tmp, &self.path)
    }

    /// Records `count` occurrences of an already-normalized pattern.
    /// Returns true iff the pattern was previously unseen.
    pub fn record_pattern(&self, pattern: &str, count: u64) -> bool {
        let mut patterns = self.patterns.lock().unwrap();
        let now = Utc::now();
        match patterns.get_mut(pattern) {
            Some(existing) => {
                existing.total_count += count;
                existing.last_seen = now;
                false
            }
            None => {
                patterns.insert(
                    pattern.to_string(),
                    LearnedPattern {
                        pattern: pattern.to_string(),
                        total_count: count,
                        first_seen: now,
                        last_seen: now,
                    },
                );
                true
            }
        }
    }

    pub fn is_known(&self, pattern: &str) -> bool {
        self.patterns.lock().unwrap().contains_key(pattern)
    }

    pub fn get_pattern(&self, pattern: &str) -> Option<LearnedPattern> {
        self.patterns.lock().unwrap().get(pattern).cloned()
    }

    pub fn all_patterns(&self) -> Vec<LearnedPattern> {
        self.patterns.lock().unwrap().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.patterns.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.patterns.lock().unwrap().clear();
    }

    /// Enriches analyzer output with "new vs known" and lifetime totals,
    /// without mutating the store.
    pub fn annotate_patterns(&self, matches: Vec<PatternMatch>) -> Vec<EnhancedPatternMatch> {
        let patterns = self.patterns.lock().unwrap();
        matches
            .into_iter()
            .map(|base| match patterns.get(&base.pattern) {
                Some(known) => EnhancedPatternMatch {
                    base,
                    is_new: false,
                    first_seen: Some(known.first_seen),
                    total_count: known.total_count,
                },
                None => EnhancedPatternMatch {
                    base,
                    is_new: true,
                    first_seen: None,
                    total_count: 0,
                },
            })
            .collect()
    }

    /// Records every match into the store and annotates with the updated
    /// totals. New patterns report the count just recorded.
    pub fn record_patterns(&self, matches: Vec<PatternMatch>) -> Vec<EnhancedPatternMatch> {
        matches
            .into_iter()
            .map(|base| {
                let is_new = self.record_pattern(&base.pattern, base.count);
                let learned = self.get_pattern(&base.pattern);
                EnhancedPatternMatch {
                    base,
                    is_new,
                    first_seen: if is_new {
                        None
                    } else {
                        learned.as_ref().map(|l| l.first_seen)
                    },
                    total_count: learned.map(|l| l.total_count).unwrap_or(0),
                }
            })
            .collect()
    }
}

fn default_patterns_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".xcw")
        .join("patterns.json")
}
