mod args;
mod console;
mod error;
mod handlers;
mod signal;

pub use args::{Cli, Commands};
pub use error::CliError;

use xcw_runtime::Config;

pub fn run(cli: Cli) -> Result<(), CliError> {
    // Config problems downgrade to a warning; the CLI works from
    // defaults.
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Warning: failed to load config: {}", err);
            Config::default()
        }
    };

    let globals = args::Globals::resolve(&cli, &config);

    match cli.command {
        Commands::Tail(tail_args) => handlers::tail::handle(&globals, &config, tail_args),
        Commands::Watch(watch_args) => handlers::watch::handle(&globals, &config, watch_args),
        Commands::Query(query_args) => handlers::query::handle(&globals, &config, query_args),
        Commands::Replay(replay_args) => handlers::replay::handle(&globals, replay_args),
        Commands::Analyze(analyze_args) => handlers::analyze::handle(&globals, analyze_args),
    }
}
