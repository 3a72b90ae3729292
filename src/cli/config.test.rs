#![cfg(test)]

use std::time::Duration;

use clap::Parser;
use difftrace_env::{AssetVar, ScopedEnv};
use serial_test::serial;
use tracing::Level;

use super::*;

#[test]
fn test_parses_inspect_cross_token() {
    let config = CliConfig::try_parse_from(["difftrace", "inspect", "runs/demo", "--layer", "mid", "--step", "5", "--token", "2"]).unwrap();
    assert_eq!(config.dataset(), "runs/demo");
    match config.command {
        Command::Inspect {
            layer,
            step,
            token,
            self_attention,
            ..
        } => {
            assert_eq!((layer.as_str(), step, token, self_attention), ("mid", 5, Some(2), false));
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn test_inspect_requires_token_or_self_attention() {
    assert!(CliConfig::try_parse_from(["difftrace", "inspect", "runs/demo", "--layer", "mid", "--step", "5"]).is_err());
    assert!(
        CliConfig::try_parse_from([
            "difftrace",
            "inspect",
            "runs/demo",
            "--layer",
            "mid",
            "--step",
            "5",
            "--token",
            "1",
            "--self-attention"
        ])
        .is_err()
    );
    assert!(CliConfig::try_parse_from(["difftrace", "inspect", "runs/demo", "--layer", "mid", "--step", "5", "--self-attention"]).is_ok());
}

#[test]
fn test_global_flags_after_subcommand() {
    let config = CliConfig::try_parse_from(["difftrace", "validate", "https://example.org/run", "--strict", "-vv", "--output-format", "json"]).unwrap();
    assert!(matches!(config.command, Command::Validate { strict: true, .. }));
    assert_eq!(config.output_format, OutputFormat::Json);
    assert_eq!(config.log_level(Level::INFO), Level::TRACE);
}

#[test]
fn test_single_verbose_raises_to_debug() {
    let config = CliConfig::try_parse_from(["difftrace", "-v", "validate", "runs/demo"]).unwrap();
    assert_eq!(config.log_level(Level::WARN), Level::DEBUG);
    assert_eq!(config.log_level(Level::TRACE), Level::TRACE);
}

#[test]
#[serial]
fn test_timeout_flag_overrides_environment() {
    let _env = ScopedEnv::set(AssetVar::RequestTimeoutMs, "5000");
    let config = CliConfig::try_parse_from(["difftrace", "validate", "runs/demo", "--timeout-ms", "250"]).unwrap();
    assert_eq!(config.asset_config().unwrap().request_timeout, Duration::from_millis(250));

    let config = CliConfig::try_parse_from(["difftrace", "validate", "runs/demo"]).unwrap();
    assert_eq!(config.asset_config().unwrap().request_timeout, Duration::from_millis(5_000));

    let config = CliConfig::try_parse_from(["difftrace", "validate", "runs/demo", "--timeout-ms", "0"]).unwrap();
    assert!(matches!(config.asset_config(), Err(CliError::Config(_))));
}
