//! Log setup. Records go to `~/.local/state/mda/mda.log`; stderr is the
//! fallback when the state directory cannot be used.
//!
//! Stdout belongs to the progress bar and probe dots, so nothing here
//! ever writes there.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count. `RUST_LOG` wins when set.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,mda=info,mda_core=info",
        1 => "info,mda=debug,mda_core=debug",
        _ => "debug,mda=trace,mda_core=trace",
    }
}

fn filter(verbose: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Hands each event a clone of the log file handle.
struct SharedLog(File);

/// A clone of the log file, or stderr when cloning the handle fails.
enum LogSink {
    File(File),
    Stderr(io::Stderr),
}

impl io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogSink::File(f) => f.write(buf),
            LogSink::Stderr(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogSink::File(f) => f.flush(),
            LogSink::Stderr(e) => e.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for SharedLog {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        match self.0.try_clone() {
            Ok(f) => LogSink::File(f),
            Err(_) => LogSink::Stderr(io::stderr()),
        }
    }
}

pub fn log_path() -> Result<PathBuf> {
    let dirs = xdg::BaseDirectories::with_prefix("mda")?;
    Ok(dirs.get_state_home().join("mda.log"))
}

/// Appends to the state-dir log file and returns its path. Errors leave the
/// global subscriber unset so the caller can use [`init_stderr`].
pub fn init_file(verbose: u8) -> Result<PathBuf> {
    let path = log_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_writer(BoxMakeWriter::new(SharedLog(file)))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    tracing::debug!(path = %path.display(), "logging to file");
    Ok(path)
}

pub fn init_stderr(verbose: u8) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
