pub mod analyze;
pub mod query;
pub mod replay;
pub mod tail;
pub mod watch;

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use xcw_engine::{Pipeline, WhereFilter};
use xcw_output::{Emitter, ErrorEvent};
use xcw_simulator::{Device, DeviceQuery};

use crate::args::{parse_duration, FilterArgs, Globals};
use crate::error::CliError;

pub(crate) fn make_emitter(globals: &Globals) -> Arc<Emitter> {
    Arc::new(Emitter::new(globals.format, globals.quiet, globals.verbose))
}

/// Emits the `error` event for a terminal failure, then hands the error
/// back for exit-code mapping. Every fatal path goes through here so the
/// stream is never silently cut.
pub(crate) fn fail(emitter: &Emitter, err: CliError) -> CliError {
    let mut event = ErrorEvent::new(&err.code, &err.message);
    if let Some(hint) = &err.hint {
        event = event.with_hint(hint);
    }
    let _ = emitter.error(&event);
    err
}

/// Centralized flag-combination checks shared by all commands.
pub(crate) fn validate_globals(globals: &Globals, emitter: &Emitter) -> Result<(), CliError> {
    if globals.quiet && globals.format == xcw_output::OutputFormat::Text {
        return Err(fail(
            emitter,
            CliError::flags("--quiet is only supported with ndjson output")
                .with_hint("switch to --format ndjson or drop --quiet"),
        ));
    }
    Ok(())
}

pub(crate) fn build_pipeline(
    filters: &FilterArgs,
    extra_exclude: Option<&str>,
    emitter: &Emitter,
) -> Result<Pipeline, CliError> {
    let pattern = match &filters.pattern {
        Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
            fail(
                emitter,
                CliError::fatal("INVALID_PATTERN", format!("invalid regex pattern: {}", e)),
            )
        })?),
        None => None,
    };

    let mut excludes = Vec::new();
    for exclude in filters
        .exclude
        .iter()
        .map(String::as_str)
        .chain(extra_exclude.into_iter().filter(|s| !s.is_empty()))
    {
        excludes.push(Regex::new(exclude).map_err(|e| {
            fail(
                emitter,
                CliError::fatal(
                    "INVALID_EXCLUDE_PATTERN",
                    format!("invalid exclude pattern: {}", e),
                ),
            )
        })?);
    }

    let where_filter = WhereFilter::parse(&filters.where_clauses)
        .map_err(|e| fail(emitter, CliError::fatal("INVALID_WHERE", e.to_string())))?;

    Ok(Pipeline::new(pattern, excludes, where_filter))
}

pub(crate) fn parse_duration_flag(
    value: &str,
    code: &str,
    emitter: &Emitter,
) -> Result<Duration, CliError> {
    parse_duration(value).map_err(|e| fail(emitter, CliError::fatal(code, e)))
}

pub(crate) fn resolve_device(query: &str, emitter: &Emitter) -> Result<Device, CliError> {
    DeviceQuery::new().resolve(query).map_err(|e| {
        let err = match &e {
            xcw_simulator::Error::NoBootedSimulator => {
                CliError::fatal(e.code(), e.to_string()).with_hint("boot a simulator first")
            }
            xcw_simulator::Error::DeviceNotFound(_) => CliError::fatal(e.code(), e.to_string())
                .with_hint("list devices with `xcrun simctl list devices`"),
            _ => CliError::fatal(e.code(), e.to_string()),
        };
        fail(emitter, err)
    })
}
