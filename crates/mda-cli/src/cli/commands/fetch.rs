//! `mda fetch` – download a file through the ranked mirrors.

use anyhow::{Context, Result};
use mda_core::config::MdaConfig;
use mda_core::session::{FetchReport, FetchRequest, Route, Session};

/// Runs the blocking session off the async runtime and prints a summary.
pub async fn run_fetch(cfg: MdaConfig, req: FetchRequest) -> Result<()> {
    tracing::info!(url = %req.url, mirrors = req.mirrors.len(), "fetch");
    let report = tokio::task::spawn_blocking(move || Session::new(cfg).fetch(&req))
        .await
        .context("download task failed")??;
    println!("{}", summary(&report));
    Ok(())
}

fn summary(report: &FetchReport) -> String {
    let o = &report.outcome;
    let mut line = if o.transferred == 0 {
        format!("{} is already complete ({} bytes)", report.path.display(), o.total_size)
    } else {
        let via = match &report.route {
            Route::Mirrors { ranked, .. } => format!("{} of {} mirrors", o.workers, ranked),
            Route::Direct { reason } => format!("origin, {}", reason),
        };
        format!(
            "saved {} ({} bytes, {} new, first host {}, via {})",
            report.path.display(),
            o.total_size,
            o.transferred,
            o.primary,
            via
        )
    };
    if report.verified {
        line.push_str("; sha256 ok");
    }
    line
}
