//! End-to-end download: mirrors, resolution, probing, ranking, transfer and
//! optional verification.
//!
//! Whenever the mirror machinery has nothing to offer (no candidates, none
//! resolvable, probing unavailable, nobody answering) the download goes
//! straight to the supplied URL with a single stream.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::checksum;
use crate::config::MdaConfig;
use crate::fetch::{CurlSource, Endpoint, RangeSource};
use crate::hosts::{resolve_targets, HostTable, Resolve, SystemResolver};
use crate::mirrors::{self, IndexLookup, MirrorLookup, StaticMirrors};
use crate::probe::{self, ProbeSummary};
use crate::rank::{self, HostReport, PreferenceList};
use crate::storage::Destination;
use crate::transfer::{self, TransferOptions, TransferOutcome};
use crate::url_model::derive_filename;

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// Extra mirrors from the command line.
    pub mirrors: Vec<String>,
    /// Query the configured mirror index.
    pub lookup: bool,
    /// Probe mirrors before ranking; otherwise keep candidate order.
    pub probe: bool,
    pub output_dir: PathBuf,
    /// Overrides `workers` from config.
    pub workers: Option<usize>,
    pub sha256: Option<String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mirrors: Vec::new(),
            lookup: true,
            probe: true,
            output_dir: PathBuf::from("."),
            workers: None,
            sha256: None,
        }
    }
}

/// How the file was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Mirrors { candidates: usize, ranked: usize },
    Direct { reason: &'static str },
}

#[derive(Debug, Clone)]
pub struct FetchReport {
    pub path: PathBuf,
    pub route: Route,
    pub outcome: TransferOutcome,
    pub verified: bool,
}

/// Result of mirror discovery and probing, without any transfer.
#[derive(Debug, Clone)]
pub struct Survey {
    pub filename: String,
    pub candidates: usize,
    pub table: HostTable,
    pub prefs: PreferenceList,
    pub summary: Option<ProbeSummary>,
}

impl Survey {
    pub fn report(&self) -> Vec<HostReport> {
        rank::report(&self.table, &self.prefs)
    }
}

enum Selection {
    Ranked { endpoints: Vec<Endpoint>, candidates: usize },
    Direct(&'static str),
}

pub struct Session<S = CurlSource, R = SystemResolver> {
    config: MdaConfig,
    source: S,
    resolver: R,
}

impl Session {
    pub fn new(config: MdaConfig) -> Self {
        let source = CurlSource::new(config.connect_timeout());
        Self::with_parts(config, source, SystemResolver)
    }
}

impl<S: RangeSource, R: Resolve> Session<S, R> {
    pub fn with_parts(config: MdaConfig, source: S, resolver: R) -> Self {
        Self {
            config,
            source,
            resolver,
        }
    }

    pub fn config(&self) -> &MdaConfig {
        &self.config
    }

    fn candidates(&self, filename: &str, extra: &[String], lookup: bool) -> Vec<String> {
        let cli = StaticMirrors::new(extra.to_vec());
        let index = match (&self.config.mirror_index, lookup) {
            (Some(template), true) => Some(IndexLookup::new(template.clone(), self.config.connect_timeout())),
            (None, true) => {
                tracing::debug!("no mirror_index configured, skipping lookup");
                None
            }
            _ => None,
        };
        let mut sources: Vec<&dyn MirrorLookup> = vec![&cli];
        if let Some(index) = &index {
            sources.push(index);
        }
        mirrors::gather(&sources, filename)
    }

    /// Host records start at the same TTL ceiling the prober enforces.
    fn resolve(&self, candidates: &[String], workers: usize) -> HostTable {
        resolve_targets(candidates, &self.resolver, self.config.probe_settings().max_ttl, workers)
    }

    fn probe(&self, table: &mut HostTable) -> Result<ProbeSummary, probe::ProbeError> {
        let term = console::Term::stdout();
        let dots = term.is_term();
        let mut tick = || {
            if dots {
                let _ = term.write_str(".");
            }
        };
        let summary = probe::probe_table(table, self.config.probe_settings(), &mut tick);
        if dots {
            let _ = term.write_line("");
        }
        summary
    }

    /// Finds, resolves and probes mirrors for `url`; probing errors are returned.
    pub fn survey(&self, url: &str, extra: &[String], lookup: bool) -> Result<Survey> {
        let filename = derive_filename(url)?;
        let candidates = self.candidates(&filename, extra, lookup);
        let mut table = self.resolve(&candidates, self.config.workers);
        let summary = if table.is_empty() {
            None
        } else {
            Some(self.probe(&mut table).context("probing mirrors")?)
        };
        let prefs = rank::rank(&table);
        Ok(Survey {
            filename,
            candidates: candidates.len(),
            table,
            prefs,
            summary,
        })
    }

    fn select(&self, req: &FetchRequest, filename: &str, workers: usize) -> Selection {
        let candidates = self.candidates(filename, &req.mirrors, req.lookup);
        if candidates.is_empty() {
            return Selection::Direct("no mirrors found");
        }
        let mut table = self.resolve(&candidates, workers);
        if table.is_empty() {
            return Selection::Direct("no mirror hostname resolved");
        }
        if req.probe {
            match self.probe(&mut table) {
                Ok(summary) => tracing::info!(
                    hosts = table.len(),
                    usable = table.valid_count(),
                    probes = summary.sent,
                    "mirror probing done"
                ),
                Err(e) => {
                    tracing::warn!("{}", e);
                    return Selection::Direct("probing unavailable");
                }
            }
        }
        let prefs = rank::rank(&table);
        for row in rank::report(&table, &prefs) {
            tracing::debug!(
                host = %row.server,
                rank = ?row.rank,
                lag_ms = ?row.avg_lag_ms,
                hops = row.hops_less_than,
                score = ?row.score,
                "host ranking"
            );
        }
        if prefs.is_empty() {
            return Selection::Direct("no mirror answered");
        }
        Selection::Ranked {
            endpoints: prefs.hosts(&table).map(Endpoint::from).collect(),
            candidates: candidates.len(),
        }
    }

    pub fn fetch(&self, req: &FetchRequest) -> Result<FetchReport> {
        let filename = derive_filename(&req.url)?;
        let path = req.output_dir.join(&filename);
        let workers = req.workers.unwrap_or(self.config.workers).max(1);

        let (endpoints, route, workers) = match self.select(req, &filename, workers) {
            Selection::Ranked { endpoints, candidates } => {
                let route = Route::Mirrors {
                    candidates,
                    ranked: endpoints.len(),
                };
                (endpoints, route, workers)
            }
            Selection::Direct(reason) => {
                tracing::info!(reason, url = %req.url, "single-stream download");
                (vec![Endpoint::direct(&req.url)], Route::Direct { reason }, 1)
            }
        };

        let dest = Destination::open(&path)?;
        let opts = TransferOptions {
            workers,
            retry: self.config.retry_policy(),
            progress: Some(self.config.progress_interval()),
        };
        let outcome = transfer::run(&dest, &endpoints, &self.source, &opts, Arc::new(AtomicU64::new(0)))
            .with_context(|| format!("downloading {}", filename))?;
        drop(dest);

        let verified = match &req.sha256 {
            Some(expected) => {
                checksum::verify_sha256(&path, expected)?;
                true
            }
            None => false,
        };
        let _ = std::io::stdout().flush();
        Ok(FetchReport {
            path,
            route,
            outcome,
            verified,
        })
    }
}
