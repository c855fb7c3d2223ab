//! Tests for `mda fetch`.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::PathBuf;

#[test]
fn cli_parse_fetch_defaults() {
    match parse(&["mda", "fetch", "http://ftp.example.org/pub/f.iso"]) {
        CliCommand::Fetch {
            url,
            workers,
            mirrors,
            no_lookup,
            no_probe,
            output_dir,
            sha256,
        } => {
            assert_eq!(url, "http://ftp.example.org/pub/f.iso");
            assert!(workers.is_none());
            assert!(mirrors.is_empty());
            assert!(!no_lookup);
            assert!(!no_probe);
            assert!(output_dir.is_none());
            assert!(sha256.is_none());
        }
        _ => panic!("expected Fetch"),
    }
}

#[test]
fn cli_parse_fetch_all_flags() {
    match parse(&[
        "mda",
        "fetch",
        "http://a.example/f.iso",
        "-w",
        "8",
        "--mirror",
        "http://b.example/f.iso",
        "-m",
        "ftp://c.example/f.iso",
        "--no-lookup",
        "--no-probe",
        "-o",
        "/tmp/dl",
        "--sha256",
        "abcd",
    ]) {
        CliCommand::Fetch {
            workers,
            mirrors,
            no_lookup,
            no_probe,
            output_dir,
            sha256,
            ..
        } => {
            assert_eq!(workers, Some(8));
            assert_eq!(mirrors, vec!["http://b.example/f.iso", "ftp://c.example/f.iso"]);
            assert!(no_lookup);
            assert!(no_probe);
            assert_eq!(output_dir, Some(PathBuf::from("/tmp/dl")));
            assert_eq!(sha256.as_deref(), Some("abcd"));
        }
        _ => panic!("expected Fetch"),
    }
}

#[test]
fn cli_rejects_zero_workers() {
    assert!(Cli::try_parse_from(["mda", "fetch", "http://a.example/f", "--workers", "0"]).is_err());
}

#[test]
fn cli_requires_url() {
    assert!(Cli::try_parse_from(["mda", "fetch"]).is_err());
}

#[test]
fn cli_verbose_is_global() {
    let cli = Cli::try_parse_from(["mda", "fetch", "http://a.example/f", "-vv"]).unwrap();
    assert_eq!(cli.verbose, 2);
    let cli = Cli::try_parse_from(["mda", "-v", "probe", "http://a.example/f"]).unwrap();
    assert_eq!(cli.verbose, 1);
}
