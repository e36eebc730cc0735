//! pjc-mc-pkg - build and deploy the pjc-mc Debian package
//!
//! Runs locally from the project root; needs fakeroot and dpkg-deb for
//! `dist`, and scp for `deploy`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pjc_mc::packaging::{DryRunRunner, PackageBuilder, SystemRunner, ToolRunner};
use pjc_mc::Config;

#[derive(Parser)]
#[command(name = "pjc-mc-pkg", version)]
#[command(about = "Build the pjc-mc Debian package")]
struct Args {
    /// Config file (default: $PJC_MC_CONFIG, then /etc/pjc-mc/pjc-mc.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Project root (overrides package.root)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Print external commands instead of running them
    #[arg(long, short = 'n', global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble the staging tree and build the .deb
    Dist,

    /// Assemble the staging tree only
    #[command(name = "update-build-tree", alias = "update_build_tree")]
    UpdateBuildTree,

    /// Build the .deb and copy it to the deploy target
    Deploy,

    /// Remove the staging tree and built archives
    Clean,
}

fn main() {
    let args = Args::parse();
    pjc_mc::logging::init();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config.package,
        Err(e) => {
            eprintln!("pjc-mc-pkg: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(root) = args.root {
        config.root = root;
    }

    let runner: Box<dyn ToolRunner> = if args.dry_run {
        Box::new(DryRunRunner)
    } else {
        Box::new(SystemRunner)
    };
    let builder = PackageBuilder::with_runner(config, runner);

    let result = match args.command {
        Command::Dist => builder.dist().map(|archive| println!("{}", archive.display())),
        Command::UpdateBuildTree => builder.update_build_tree().map(|tree| {
            println!("{} ({})", tree.stage.display(), tree.build_version);
        }),
        Command::Deploy => builder.deploy().map(|archive| println!("{}", archive.display())),
        Command::Clean => builder.clean(),
    };

    if let Err(e) = result {
        eprintln!("pjc-mc-pkg: {}", e);
        std::process::exit(1);
    }
}
