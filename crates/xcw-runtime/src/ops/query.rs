use std::io::BufRead;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use xcw_engine::Pipeline;
use xcw_output::{Emitter, LogEvent, ReplayComplete};
use xcw_simulator::{StreamMode, StreamOptions, StreamSource};
use xcw_types::LogLevel;

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub app: String,
    pub min_level: Option<LogLevel>,
    /// Window back from now handed to the subprocess as `--start`.
    pub since: Option<Duration>,
    pub limit: Option<u64>,
}

/// Bounded historical query: one `log show`-style invocation drained to
/// EOF through the same filter pipeline and emitter as the live path.
pub fn query(
    source: &dyn StreamSource,
    udid: &str,
    opts: &QueryOptions,
    pipeline: &Pipeline,
    emitter: &Emitter,
    tail_id: &str,
) -> Result<u64> {
    let start = opts
        .since
        .map(|since| (Utc::now() - since).format("%Y-%m-%d %H:%M:%S").to_string());

    let stream_opts = StreamOptions {
        mode: StreamMode::Show,
        bundle_id: opts.app.clone(),
        min_level: opts.min_level,
        start,
        exclude_subsystems: Vec::new(),
    };

    let mut handle = source.open(udid, &stream_opts)?;

    let mut emitted: u64 = 0;
    let mut line = String::new();
    loop {
        line.clear();
        if handle.reader.read_line(&mut line)? == 0 {
            break;
        }
        let Some(Ok(entry)) = xcw_simulator::schema::parse_stream_line(&line) else {
            continue;
        };
        if !pipeline.matches(&entry) {
            continue;
        }

        emitter.log(&LogEvent::new(&entry, tail_id, 1))?;
        emitted += 1;

        if let Some(limit) = opts.limit {
            if emitted >= limit {
                break;
            }
        }
    }

    if let Some(mut child) = handle.child.take() {
        let _ = child.kill();
        let _ = child.wait();
    }

    let mut complete = ReplayComplete::new(emitted);
    complete.event_type = "query_complete".to_string();
    emitter.replay_complete(&complete)?;
    emitter.flush()?;
    Ok(emitted)
}
