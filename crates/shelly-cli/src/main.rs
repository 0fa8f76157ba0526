mod cli;
mod commands;
mod context;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            std::process::exit(code);
        }
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<i32, CliError> {
    // Completions don't need the core wired up.
    if let Command::Completions(args) = &cli.command {
        use clap::CommandFactory;
        let mut cmd = Cli::command();
        clap_complete::generate(args.shell, &mut cmd, "shellyctl", &mut std::io::stdout());
        return Ok(error::exit_code::SUCCESS);
    }

    let ctx = context::AppContext::init(cli.global.config.as_deref())?;

    match cli.command {
        Command::Discover(args) => commands::discover::handle(&ctx, args, &cli.global).await,
        Command::Devices(args) => commands::devices::handle(&ctx, args, &cli.global).await,
        Command::Groups(args) => commands::groups::handle(&ctx, args, &cli.global).await,
        Command::Parameters(args) => commands::parameters::handle(&ctx, args, &cli.global).await,
        Command::Capabilities(args) => {
            commands::capabilities::handle(&ctx, args, &cli.global).await
        }
        Command::Completions(_) => unreachable!("handled above"),
    }
}
