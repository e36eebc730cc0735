mod commands;

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use pjc_mc::logging;
use pjc_mc::supervisor::{Supervisor, EXIT_FAILURE, EXIT_USAGE};
use pjc_mc::Config;

#[derive(Parser)]
#[command(name = "pjc-mc", version)]
#[command(about = "Start, stop and query the pjc-mc web server")]
struct Args {
    /// Config file (default: $PJC_MC_CONFIG, then /etc/pjc-mc/pjc-mc.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the server unless a live instance holds the PID file
    Start,

    /// Stop the server recorded in the PID file
    Stop,

    /// Report whether the server is in the process table
    Status,

    /// Stop, then start
    Restart,

    /// Same as restart
    ForceReload,
}

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => EXIT_USAGE,
            };
            std::process::exit(code);
        }
    };

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pjc-mc: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    };
    let supervisor = Supervisor::new(config.supervisor);

    // VERBOSE in the override file quiets the supervisor too
    let verbose = logging::verbose_setting(&supervisor.override_env());
    logging::init_with(verbose.as_deref());

    let code = match args.command {
        Command::Start => commands::start(&supervisor).await,
        Command::Stop => commands::stop(&supervisor).await,
        Command::Status => commands::status(&supervisor),
        Command::Restart | Command::ForceReload => commands::restart(&supervisor).await,
    };

    std::process::exit(code);
}
