//! pjc-mc-kiosk - open the pjc-mc display page once the server answers
//!
//! Probes the server host with ping, then starts the configured browser in
//! kiosk mode and exits. Ctrl-C abandons the wait.

use std::path::PathBuf;

use clap::Parser;
use pjc_mc::launcher::LaunchError;
use pjc_mc::{Config, Launcher};

#[derive(Parser)]
#[command(name = "pjc-mc-kiosk", version)]
#[command(about = "Wait for the pjc-mc server, then open the display in kiosk mode")]
struct Args {
    /// Config file (default: $PJC_MC_CONFIG, then /etc/pjc-mc/pjc-mc.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Host to wait for
    #[arg(long)]
    host: Option<String>,

    /// URL to open (default: http://<host>:<port>/<path>)
    #[arg(long)]
    url: Option<String>,

    /// Give up after this many failed probes
    #[arg(long)]
    max_attempts: Option<u32>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    pjc_mc::logging::init();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config.launcher,
        Err(e) => {
            eprintln!("pjc-mc-kiosk: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if args.url.is_some() {
        config.url = args.url;
    }
    if args.max_attempts.is_some() {
        config.max_attempts = args.max_attempts;
    }

    let launcher = match Launcher::from_config(&config) {
        Ok(launcher) => launcher,
        Err(e) => {
            eprintln!("pjc-mc-kiosk: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match launcher.run(cancel).await {
        Ok(()) => {}
        Err(LaunchError::Cancelled { attempts }) => {
            log::warn!("Interrupted after {} probe(s)", attempts);
            std::process::exit(130);
        }
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
