use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use xcw_output::OutputFormat;
use xcw_runtime::Config;
use xcw_types::LogLevel;

#[derive(Parser)]
#[command(name = "xcw")]
#[command(about = "Tail iOS Simulator logs for AI agents", long_about = None)]
#[command(version)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Output format; NDJSON is the agent contract
    #[arg(long, global = true, value_enum)]
    pub format: Option<FormatArg>,

    /// Minimum log level forwarded from the device
    #[arg(long, global = true)]
    pub level: Option<String>,

    /// Suppress stderr prose (NDJSON on stdout is never suppressed)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Emit session_debug transition events
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Ndjson,
    Text,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream logs for an app bundle as NDJSON events
    Tail(TailArgs),
    /// Tail with trigger commands on matching logs
    Watch(WatchArgs),
    /// Bounded historical query instead of a live stream
    Query(QueryArgs),
    /// Re-run a captured NDJSON file through the filter pipeline
    Replay(ReplayArgs),
    /// Offline pattern and anomaly analysis of a captured file
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Clone, Args)]
pub struct TailArgs {
    /// Simulator name, UDID, or "booted"
    #[arg(long, short = 's')]
    pub simulator: Option<String>,

    /// App bundle identifier to trace
    #[arg(long, short = 'a', required = true)]
    pub app: String,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Collapse repeats: bare flag for consecutive, or a window like "30s"
    #[arg(long, value_name = "WINDOW", num_args = 0..=1, default_missing_value = "consecutive")]
    pub dedupe: Option<String>,

    /// Keepalive interval while no logs flow
    #[arg(long)]
    pub heartbeat: Option<String>,

    /// Aggregate summary interval
    #[arg(long)]
    pub summary_interval: Option<String>,

    /// Close the session after this much inactivity
    #[arg(long)]
    pub session_idle: Option<String>,

    /// Stop after emitting this many logs
    #[arg(long)]
    pub max_logs: Option<u64>,

    /// Stop after this much wall-clock time
    #[arg(long)]
    pub max_duration: Option<String>,

    /// Also write NDJSON to this file, rotated per session
    #[arg(long, short = 'o')]
    pub output: Option<std::path::PathBuf>,

    /// Continue from the previous run's last log timestamp
    #[arg(long)]
    pub resume: bool,
}

/// Filter flags shared by the streaming and offline surfaces.
#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Regex the message must match
    #[arg(long, short = 'p')]
    pub pattern: Option<String>,

    /// Regex that drops matching messages (repeatable)
    #[arg(long, short = 'x')]
    pub exclude: Vec<String>,

    /// Drop logs from a subsystem; trailing * is a prefix match (repeatable)
    #[arg(long)]
    pub exclude_subsystem: Vec<String>,

    /// Structured predicate like "level>=error" or "message~timeout" (repeatable)
    #[arg(long = "where")]
    pub where_clauses: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub tail: TailArgs,

    /// Command to run on error-level logs
    #[arg(long)]
    pub on_error: Option<String>,

    /// Command to run on fault-level logs
    #[arg(long)]
    pub on_fault: Option<String>,

    /// pattern:command pair, e.g. "crash:./notify.sh" (repeatable)
    #[arg(long)]
    pub on_pattern: Vec<String>,

    /// Minimum time between firings of the same trigger
    #[arg(long, default_value = "5s")]
    pub cooldown: String,

    /// Kill a trigger command after this long
    #[arg(long, default_value = "30s")]
    pub trigger_timeout: String,

    /// What to do with trigger stdout/stderr
    #[arg(long, value_enum, default_value = "discard")]
    pub trigger_output: TriggerOutputArg,

    /// Tokenize the command yourself instead of using `sh -c`
    #[arg(long)]
    pub trigger_no_shell: bool,

    /// Concurrent trigger invocations before skipping with saturation
    #[arg(long, default_value_t = 4)]
    pub max_parallel_triggers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TriggerOutputArg {
    Discard,
    Inherit,
    Capture,
}

#[derive(Debug, Clone, Args)]
pub struct QueryArgs {
    /// Simulator name, UDID, or "booted"
    #[arg(long, short = 's')]
    pub simulator: Option<String>,

    /// App bundle identifier
    #[arg(long, short = 'a', required = true)]
    pub app: String,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// How far back to query, e.g. "5m"
    #[arg(long)]
    pub since: Option<String>,

    /// Maximum number of logs to return
    #[arg(long)]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Args)]
pub struct ReplayArgs {
    /// NDJSON file to replay
    #[arg(long, short = 'f', required = true)]
    pub file: std::path::PathBuf,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Only replay entries younger than this
    #[arg(long)]
    pub since: Option<String>,

    /// Stop after this many replayed logs
    #[arg(long)]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Args)]
pub struct AnalyzeArgs {
    /// NDJSON file to analyze
    #[arg(long, short = 'f', required = true)]
    pub file: std::path::PathBuf,

    /// Patterns kept in the report, ordered by frequency
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Record observed patterns into the learned-pattern store
    #[arg(long)]
    pub persist_patterns: bool,

    /// Pattern store override (default: <state-dir>/patterns.json)
    #[arg(long)]
    pub patterns_file: Option<std::path::PathBuf>,
}

/// Effective global settings after config-file fallback.
#[derive(Debug, Clone)]
pub struct Globals {
    pub format: OutputFormat,
    pub level: Option<LogLevel>,
    pub quiet: bool,
    pub verbose: bool,
}

impl Globals {
    pub fn resolve(cli: &Cli, config: &Config) -> Globals {
        let format = match cli.format {
            Some(FormatArg::Ndjson) => OutputFormat::Ndjson,
            Some(FormatArg::Text) => OutputFormat::Text,
            None => match config.format.as_str() {
                "text" => OutputFormat::Text,
                _ => OutputFormat::Ndjson,
            },
        };

        let level_name = cli.level.clone().unwrap_or_else(|| config.level.clone());
        let level = if level_name.trim().is_empty() {
            None
        } else {
            Some(LogLevel::parse(&level_name))
        };

        Globals {
            format,
            level,
            quiet: cli.quiet || config.quiet,
            verbose: cli.verbose || config.verbose,
        }
    }
}

/// Parses durations like "500ms", "30s", "5m", "1h" or bare seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let (digits, unit) = match input.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => input.split_at(idx),
        None => (input, "s"),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration: {}", input))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(format!("invalid duration unit in: {}", input)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_durations() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("-3s").is_err());
    }

    #[test]
    fn cli_parses_a_full_tail_invocation() {
        let cli = Cli::try_parse_from([
            "xcw",
            "tail",
            "-a",
            "com.example.app",
            "-s",
            "booted",
            "--pattern",
            "error",
            "--exclude",
            "noise",
            "--where",
            "level>=error",
            "--dedupe",
            "--max-logs",
            "100",
        ])
        .unwrap();

        match cli.command {
            Commands::Tail(tail) => {
                assert_eq!(tail.app, "com.example.app");
                assert_eq!(tail.filters.where_clauses, vec!["level>=error"]);
                assert_eq!(tail.dedupe.as_deref(), Some("consecutive"));
                assert_eq!(tail.max_logs, Some(100));
            }
            _ => panic!("expected tail"),
        }
    }

    #[test]
    fn watch_accepts_trigger_flags() {
        let cli = Cli::try_parse_from([
            "xcw",
            "watch",
            "-a",
            "com.ex",
            "--on-error",
            "./notify.sh",
            "--on-pattern",
            "crash:./page.sh",
            "--cooldown",
            "10s",
            "--trigger-no-shell",
        ])
        .unwrap();

        match cli.command {
            Commands::Watch(watch) => {
                assert_eq!(watch.on_error.as_deref(), Some("./notify.sh"));
                assert_eq!(watch.on_pattern, vec!["crash:./page.sh"]);
                assert!(watch.trigger_no_shell);
            }
            _ => panic!("expected watch"),
        }
    }
}
