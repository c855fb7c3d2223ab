//! Tests for `mda probe` and `mda completions`.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

#[test]
fn cli_parse_probe() {
    match parse(&["mda", "probe", "http://a.example/f.iso", "-m", "http://b.example/f.iso", "--json"]) {
        CliCommand::Probe {
            url,
            mirrors,
            no_lookup,
            json,
        } => {
            assert_eq!(url, "http://a.example/f.iso");
            assert_eq!(mirrors, vec!["http://b.example/f.iso"]);
            assert!(!no_lookup);
            assert!(json);
        }
        _ => panic!("expected Probe"),
    }
}

#[test]
fn cli_parse_completions() {
    match parse(&["mda", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, Shell::Bash),
        _ => panic!("expected Completions"),
    }
    assert!(Cli::try_parse_from(["mda", "completions", "tcsh"]).is_err());
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}
