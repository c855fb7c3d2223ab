use clap::Parser;
use mda_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The log file is best effort; stderr keeps the CLI usable without it.
    if logging::init_file(cli.verbose).is_err() {
        logging::init_stderr(cli.verbose);
    }

    if let Err(err) = cli.run().await {
        eprintln!("mda error: {:#}", err);
        std::process::exit(1);
    }
}
