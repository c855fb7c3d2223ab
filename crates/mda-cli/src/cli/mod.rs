//! CLI for the MDA mirror-aware download accelerator.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use mda_core::config;
use std::path::PathBuf;

use commands::{run_completions, run_fetch, run_probe, ProbeArgs};
use mda_core::session::FetchRequest;

/// Top-level CLI for MDA.
#[derive(Debug, Parser)]
#[command(name = "mda", version)]
#[command(about = "MDA: mirror-aware multi-stream download accelerator", long_about = None)]
pub struct Cli {
    /// More log detail (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a file, spreading the transfer over the nearest mirrors.
    Fetch {
        /// HTTP, HTTPS or FTP URL of the file.
        url: String,

        /// Parallel streams (default from config).
        #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
        workers: Option<u16>,

        /// Additional mirror URL of the same file (repeatable).
        #[arg(short, long = "mirror", value_name = "URL")]
        mirrors: Vec<String>,

        /// Do not query the configured mirror index.
        #[arg(long)]
        no_lookup: bool,

        /// Skip hop probing; mirrors are used in the order given.
        #[arg(long)]
        no_probe: bool,

        /// Directory to write into (default: current directory).
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Expected SHA-256 of the finished file (hex).
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,
    },

    /// Find and probe mirrors for a URL and print the ranking, without downloading.
    Probe {
        url: String,

        /// Additional mirror URL (repeatable).
        #[arg(short, long = "mirror", value_name = "URL")]
        mirrors: Vec<String>,

        /// Do not query the configured mirror index.
        #[arg(long)]
        no_lookup: bool,

        /// Print the host report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        if let CliCommand::Completions { shell } = self.command {
            return run_completions(shell);
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match self.command {
            CliCommand::Fetch {
                url,
                workers,
                mirrors,
                no_lookup,
                no_probe,
                output_dir,
                sha256,
            } => {
                let output_dir = match output_dir {
                    Some(dir) => dir,
                    None => std::env::current_dir()?,
                };
                let req = FetchRequest {
                    url,
                    workers: workers.map(usize::from),
                    mirrors,
                    lookup: !no_lookup,
                    probe: !no_probe,
                    output_dir,
                    sha256,
                };
                run_fetch(cfg, req).await?;
            }
            CliCommand::Probe {
                url,
                mirrors,
                no_lookup,
                json,
            } => {
                let args = ProbeArgs {
                    url,
                    mirrors,
                    lookup: !no_lookup,
                    json,
                };
                run_probe(cfg, args).await?;
            }
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
