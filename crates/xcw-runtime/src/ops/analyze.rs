use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};

use xcw_engine::normalize_message;
use xcw_output::{Analysis, AnalysisSummary, Emitter, LevelCounts, PatternMatch, PatternStore};

const SAMPLES_PER_PATTERN: usize = 3;

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub file: PathBuf,
    /// How many patterns the report keeps, ordered by frequency.
    pub top: usize,
    /// Record the observed patterns into the persistent store.
    pub persist: bool,
}

struct PatternAgg {
    count: u64,
    samples: Vec<String>,
}

/// Offline pattern/anomaly analysis over a captured NDJSON file: classify
/// each entry, collapse messages to normalized templates, and emit one
/// `analysis` object annotated against the learned-pattern store.
pub fn analyze(
    opts: &AnalyzeOptions,
    store: &PatternStore,
    emitter: &Emitter,
) -> Result<Analysis> {
    let file = std::fs::File::open(&opts.file)
        .with_context(|| format!("opening {}", opts.file.display()))?;
    let reader = BufReader::new(file);

    let mut counts = LevelCounts::default();
    let mut total: u64 = 0;
    let mut patterns: HashMap<String, PatternAgg> = HashMap::new();

    for line in reader.lines() {
        let line = line?;
        let Some((entry, _)) = super::replay::decode_line(&line) else {
            continue;
        };

        total += 1;
        counts.record(entry.level);

        let template = normalize_message(&entry.message);
        let agg = patterns.entry(template).or_insert_with(|| PatternAgg {
            count: 0,
            samples: Vec::new(),
        });
        agg.count += 1;
        if agg.samples.len() < SAMPLES_PER_PATTERN {
            agg.samples.push(entry.message);
        }
    }

    let mut matches: Vec<PatternMatch> = patterns
        .into_iter()
        .map(|(pattern, agg)| PatternMatch {
            pattern,
            count: agg.count,
            samples: agg.samples,
        })
        .collect();
    matches.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.pattern.cmp(&b.pattern)));
    // The summary counts every distinct template; --top only bounds the
    // emitted pattern list.
    let unique_patterns = matches.len() as u64;
    matches.truncate(opts.top);

    let enhanced = if opts.persist {
        let enhanced = store.record_patterns(matches);
        store.save()?;
        enhanced
    } else {
        store.annotate_patterns(matches)
    };

    let new_patterns = enhanced.iter().filter(|p| p.is_new).count() as u64;
    let analysis = Analysis::new(
        AnalysisSummary {
            total,
            counts,
            unique_patterns,
            new_patterns,
        },
        enhanced,
    );

    emitter.analysis(&analysis)?;
    emitter.flush()?;
    Ok(analysis)
}
