use xcw_output::PatternStore;
use xcw_runtime::AnalyzeOptions;

use crate::args::{AnalyzeArgs, Globals};
use crate::error::CliError;

use super::{fail, make_emitter, validate_globals};

pub fn handle(globals: &Globals, args: AnalyzeArgs) -> Result<(), CliError> {
    let emitter = make_emitter(globals);
    validate_globals(globals, &emitter)?;

    let patterns_path = args
        .patterns_file
        .clone()
        .unwrap_or_else(|| xcw_runtime::config::state_dir().join("patterns.json"));
    let store = PatternStore::new(Some(patterns_path));

    let opts = AnalyzeOptions {
        file: args.file.clone(),
        top: args.top,
        persist: args.persist_patterns,
    };

    xcw_runtime::analyze(&opts, &store, &emitter).map_err(|e| {
        fail(
            &emitter,
            CliError::fatal("ANALYZE_FAILED", format!("analyze failed: {}", e)),
        )
    })?;

    Ok(())
}
