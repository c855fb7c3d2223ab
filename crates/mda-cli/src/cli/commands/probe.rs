//! `mda probe` – rank mirrors without downloading.

use anyhow::{Context, Result};
use console::style;
use mda_core::config::MdaConfig;
use mda_core::rank::HostReport;
use mda_core::session::Session;

#[derive(Debug, Clone)]
pub struct ProbeArgs {
    pub url: String,
    pub mirrors: Vec<String>,
    pub lookup: bool,
    pub json: bool,
}

pub async fn run_probe(cfg: MdaConfig, args: ProbeArgs) -> Result<()> {
    let json = args.json;
    let survey = tokio::task::spawn_blocking(move || Session::new(cfg).survey(&args.url, &args.mirrors, args.lookup))
        .await
        .context("probe task failed")??;
    let rows = survey.report();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No mirrors found for {} ({} candidates).", survey.filename, survey.candidates);
        return Ok(());
    }
    println!("{}", style(header()).bold());
    for row in &rows {
        let line = format_row(row);
        if row.invalid {
            println!("{}", style(line).dim());
        } else if row.rank == Some(1) {
            println!("{}", style(line).green());
        } else {
            println!("{}", line);
        }
    }
    if let Some(s) = &survey.summary {
        println!(
            "{} probes sent, {} replies, {} hosts discarded",
            s.sent, s.replies, s.discarded
        );
    }
    Ok(())
}

fn header() -> String {
    format!(
        "{:>4}  {:<28} {:<15} {:>7} {:>7} {:>8} {:>10}",
        "RANK", "HOST", "ADDRESS", "HOPS", "REPLIES", "LAG(ms)", "SCORE"
    )
}

fn format_row(row: &HostReport) -> String {
    let rank = row.rank.map_or_else(|| "-".to_string(), |r| r.to_string());
    let hops = if row.hops_more_than.saturating_add(1) >= row.hops_less_than {
        row.hops_less_than.to_string()
    } else {
        format!("{}-{}", row.hops_more_than.saturating_add(1), row.hops_less_than)
    };
    let lag = row.avg_lag_ms.map_or_else(|| "-".to_string(), |l| l.to_string());
    let score = row.score.map_or_else(|| "-".to_string(), |s| s.to_string());
    format!(
        "{:>4}  {:<28} {:<15} {:>7} {:>7} {:>8} {:>10}",
        rank,
        row.server,
        row.address,
        hops,
        format!("{}/{}", row.replies, row.sent),
        lag,
        score
    )
}
