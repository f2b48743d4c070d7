use std::sync::Arc;

use xcw_engine::{DedupeFilter, DedupeMode};
use xcw_output::{Emitter, OutputFormat};
use xcw_runtime::{Config, Tail, TailConfig};
use xcw_simulator::SimctlSource;

use crate::args::{Globals, TailArgs};
use crate::error::CliError;
use crate::signal;

use super::{build_pipeline, make_emitter, parse_duration_flag, resolve_device, validate_globals};

pub fn handle(globals: &Globals, config: &Config, args: TailArgs) -> Result<(), CliError> {
    let emitter = make_emitter(globals);
    let tail = build(globals, config, &args, emitter.clone())?;
    run(tail, emitter)
}

/// Shared by `tail` and `watch`: everything up to (not including) the
/// event loop.
pub(crate) fn build(
    globals: &Globals,
    config: &Config,
    args: &TailArgs,
    emitter: Arc<Emitter>,
) -> Result<Tail, CliError> {
    validate_globals(globals, &emitter)?;

    let extra_exclude = if config.defaults.exclude_pattern.is_empty() {
        None
    } else {
        Some(config.defaults.exclude_pattern.as_str())
    };
    let pipeline = build_pipeline(&args.filters, extra_exclude, &emitter)?;

    let dedupe = match args.dedupe.as_deref() {
        None => None,
        Some("consecutive") => Some(DedupeFilter::new(DedupeMode::Consecutive)),
        Some(window) => {
            let window = parse_duration_flag(window, "INVALID_DURATION", &emitter)?;
            Some(DedupeFilter::new(DedupeMode::Windowed(window)))
        }
    };

    let heartbeat_flag = args
        .heartbeat
        .clone()
        .unwrap_or_else(|| config.defaults.heartbeat.clone());
    let heartbeat = parse_duration_flag(&heartbeat_flag, "INVALID_HEARTBEAT", &emitter)?;

    let summary_flag = args
        .summary_interval
        .clone()
        .unwrap_or_else(|| config.defaults.summary_interval.clone());
    let summary_interval = parse_duration_flag(&summary_flag, "INVALID_INTERVAL", &emitter)?;

    let session_idle = match &args.session_idle {
        Some(idle) => Some(parse_duration_flag(idle, "INVALID_DURATION", &emitter)?),
        None => None,
    };

    let max_duration = match &args.max_duration {
        Some(duration) => Some(parse_duration_flag(duration, "INVALID_DURATION", &emitter)?),
        None => None,
    };

    let simulator = args
        .simulator
        .clone()
        .unwrap_or_else(|| config.defaults.simulator.clone());
    let device = resolve_device(&simulator, &emitter)?;

    let mut exclude_subsystems = args.filters.exclude_subsystem.clone();
    exclude_subsystems.extend(config.defaults.exclude_subsystems.iter().cloned());

    if globals.format == OutputFormat::Text && !globals.quiet {
        crate::console::print_watching(&device, &args.app, "tail");
    }

    let tail_config = TailConfig {
        app: args.app.clone(),
        min_level: globals.level,
        exclude_subsystems,
        heartbeat,
        summary_interval,
        session_idle,
        max_logs: args.max_logs,
        max_duration,
        output: args.output.clone(),
        resume: args.resume,
        resume_path: None,
        supervisor_policy: None,
    };

    Ok(Tail::new(tail_config, device, emitter, pipeline, dedupe))
}

pub(crate) fn run(tail: Tail, emitter: Arc<Emitter>) -> Result<(), CliError> {
    signal::install_cancel_handler(tail.cancel_flag());

    // Stream-start and stream-death errors are emitted by the
    // orchestrator itself; here they only map to the exit code.
    let outcome = tail
        .run(Arc::new(SimctlSource::new()))
        .map_err(|e| CliError::fatal("STREAM_FAILED", e.to_string()))?;

    if outcome.is_failure() {
        return Err(CliError::fatal("STREAM_FAILED", "log stream failed"));
    }

    let _ = emitter.flush();
    Ok(())
}
