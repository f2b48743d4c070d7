use std::time::Duration;

use regex::Regex;

use xcw_runtime::{Config, TriggerConfig, TriggerExecutor, TriggerOutput};

use crate::args::{Globals, TriggerOutputArg, WatchArgs};
use crate::error::CliError;

use super::{fail, make_emitter, parse_duration_flag};

pub fn handle(globals: &Globals, config: &Config, args: WatchArgs) -> Result<(), CliError> {
    let emitter = make_emitter(globals);

    let trigger_config = parse_triggers(&args, &emitter)?;
    if !trigger_config.has_triggers() {
        return Err(fail(
            &emitter,
            CliError::flags("watch mode needs at least one trigger")
                .with_hint("add --on-error, --on-fault or --on-pattern"),
        ));
    }

    let mut tail = super::tail::build(globals, config, &args.tail, emitter.clone())?;

    if globals.format == xcw_output::OutputFormat::Text && !globals.quiet {
        if let Some(command) = &args.on_error {
            crate::console::print_trigger("error", command);
        }
        if let Some(command) = &args.on_fault {
            crate::console::print_trigger("fault", command);
        }
        for pair in &args.on_pattern {
            crate::console::print_trigger("pattern", pair);
        }
    }

    let executor = TriggerExecutor::new(trigger_config, emitter.clone(), tail.tail_id());
    tail.set_triggers(executor);

    super::tail::run(tail, emitter)
}

fn parse_triggers(
    args: &WatchArgs,
    emitter: &xcw_output::Emitter,
) -> Result<TriggerConfig, CliError> {
    let cooldown = parse_cooldown(&args.cooldown, emitter)?;
    let timeout = parse_duration_flag(&args.trigger_timeout, "INVALID_DURATION", emitter)?;

    let mut on_pattern = Vec::new();
    for pair in &args.on_pattern {
        let Some((pattern, command)) = pair.split_once(':') else {
            return Err(fail(
                emitter,
                CliError::fatal(
                    "INVALID_TRIGGER",
                    format!("invalid pattern:command format: {}", pair),
                ),
            ));
        };
        if command.is_empty() {
            return Err(fail(
                emitter,
                CliError::fatal(
                    "INVALID_TRIGGER",
                    format!("empty command in trigger: {}", pair),
                ),
            ));
        }
        let regex = Regex::new(pattern).map_err(|e| {
            fail(
                emitter,
                CliError::fatal(
                    "INVALID_TRIGGER_PATTERN",
                    format!("invalid trigger pattern: {}", e),
                ),
            )
        })?;
        on_pattern.push((regex, command.to_string()));
    }

    Ok(TriggerConfig {
        on_error: args.on_error.clone(),
        on_fault: args.on_fault.clone(),
        on_pattern,
        cooldown,
        timeout,
        max_parallel: args.max_parallel_triggers,
        output: match args.trigger_output {
            TriggerOutputArg::Discard => TriggerOutput::Discard,
            TriggerOutputArg::Inherit => TriggerOutput::Inherit,
            TriggerOutputArg::Capture => TriggerOutput::Capture,
        },
        use_shell: !args.trigger_no_shell,
    })
}

fn parse_cooldown(value: &str, emitter: &xcw_output::Emitter) -> Result<Duration, CliError> {
    crate::args::parse_duration(value).map_err(|e| {
        fail(
            emitter,
            CliError::fatal("INVALID_COOLDOWN", format!("invalid cooldown duration: {}", e)),
        )
    })
}
