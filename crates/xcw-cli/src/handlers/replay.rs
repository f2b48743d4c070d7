use xcw_runtime::ReplayOptions;

use crate::args::{Globals, ReplayArgs};
use crate::error::CliError;

use super::{build_pipeline, fail, make_emitter, parse_duration_flag, validate_globals};

pub fn handle(globals: &Globals, args: ReplayArgs) -> Result<(), CliError> {
    let emitter = make_emitter(globals);
    validate_globals(globals, &emitter)?;

    let pipeline = build_pipeline(&args.filters, None, &emitter)?;

    let since = match &args.since {
        Some(since) => Some(parse_duration_flag(since, "INVALID_DURATION", &emitter)?),
        None => None,
    };

    let opts = ReplayOptions {
        file: args.file.clone(),
        since,
        limit: args.limit,
    };

    xcw_runtime::replay(&opts, &pipeline, &emitter, "replay").map_err(|e| {
        fail(
            &emitter,
            CliError::fatal("REPLAY_FAILED", format!("replay failed: {}", e)),
        )
    })?;

    Ok(())
}
