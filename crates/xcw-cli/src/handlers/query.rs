use xcw_runtime::{Config, QueryOptions};
use xcw_simulator::SimctlSource;

use crate::args::{Globals, QueryArgs};
use crate::error::CliError;

use super::{build_pipeline, fail, make_emitter, parse_duration_flag, resolve_device, validate_globals};

pub fn handle(globals: &Globals, config: &Config, args: QueryArgs) -> Result<(), CliError> {
    let emitter = make_emitter(globals);
    validate_globals(globals, &emitter)?;

    let pipeline = build_pipeline(&args.filters, None, &emitter)?;

    let since_flag = args
        .since
        .clone()
        .unwrap_or_else(|| config.defaults.since.clone());
    let since = parse_duration_flag(&since_flag, "INVALID_DURATION", &emitter)?;
    let limit = args.limit.unwrap_or(config.defaults.limit);

    let simulator = args
        .simulator
        .clone()
        .unwrap_or_else(|| config.defaults.simulator.clone());
    let device = resolve_device(&simulator, &emitter)?;

    let opts = QueryOptions {
        app: args.app.clone(),
        min_level: globals.level,
        since: Some(since),
        limit: Some(limit),
    };

    xcw_runtime::query(
        &SimctlSource::new(),
        &device.udid,
        &opts,
        &pipeline,
        &emitter,
        "query",
    )
    .map_err(|e| {
        fail(
            &emitter,
            CliError::fatal("QUERY_FAILED", format!("query failed: {}", e)),
        )
    })?;

    Ok(())
}
