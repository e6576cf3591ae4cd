use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use clap_handler::Handler;
use tracing_subscriber::EnvFilter;

mod commands;
mod select;

#[derive(Parser, clap_handler::Handler, Clone)]
#[clap(name = "cmovies", version, about)]
struct CmoviesArgs {
    /// Debug output
    #[clap(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print results and errors
    #[clap(short, long, global = true)]
    quiet: bool,

    #[clap(subcommand)]
    command: commands::CmoviesCommand,
}

/// `--quiet`, recorded before the command runs.
static QUIET: AtomicBool = AtomicBool::new(false);

pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

fn init_logging(verbose: bool, quiet: bool) {
    // chromiumoxide reports every unknown protocol event as an error
    let default = if quiet {
        "error,chromiumoxide=off"
    } else if verbose {
        "debug"
    } else {
        "info,chromiumoxide=off"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CmoviesArgs::parse();
    init_logging(args.verbose, args.quiet);
    QUIET.store(args.quiet, Ordering::Relaxed);
    args.run().await
}
