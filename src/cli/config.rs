use std::time::Duration;

use clap::{Parser, Subcommand};
use difftrace_assets::AssetConfig;
use tracing::Level;

use super::error::CliError;

/// Command-line interface configuration for the difftrace binary
#[derive(Debug, Parser)]
#[command(name = "difftrace")]
#[command(about = "Validate and inspect diffusion attention trace datasets", long_about = None)]
pub struct CliConfig {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output (repeat for trace-level logs)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Compute request timeout in milliseconds (overrides DIFFTRACE_REQUEST_TIMEOUT_MS)
    #[arg(long, value_name = "MS", global = true)]
    pub timeout_ms: Option<u64>,

    /// Output format (text, json)
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a dataset and check every attention file against its declared shape
    Validate {
        /// Base URL or local directory of the dataset
        #[arg(value_name = "DATASET")]
        dataset: String,

        /// Treat warnings as failure
        #[arg(long)]
        strict: bool,
    },
    /// Decode one attention map and print summary statistics
    Inspect {
        #[arg(value_name = "DATASET")]
        dataset: String,

        #[arg(long)]
        layer: String,

        #[arg(long)]
        step: u32,

        /// Token index of a cross-attention map
        #[arg(long, required_unless_present = "self_attention", conflicts_with = "self_attention")]
        token: Option<usize>,

        /// Inspect the self-attention map instead
        #[arg(long)]
        self_attention: bool,
    },
    /// Jensen-Shannon divergence between one token's maps at two steps
    Divergence {
        #[arg(value_name = "DATASET")]
        dataset: String,

        #[arg(long)]
        layer: String,

        #[arg(long)]
        step_a: u32,

        #[arg(long)]
        step_b: u32,

        #[arg(long)]
        token: usize,
    },
}

/// Output format options
#[derive(Debug, Clone, Copy, clap::ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable text (default)
    Text,
    /// One JSON document per command
    Json,
}

impl CliConfig {
    pub fn dataset(&self) -> &str {
        match &self.command {
            Command::Validate { dataset, .. } | Command::Inspect { dataset, .. } | Command::Divergence { dataset, .. } => dataset,
        }
    }

    /// `-v` raises the configured level to debug, `-vv` to trace.
    pub fn log_level(&self, configured: Level) -> Level {
        match self.verbose {
            0 => configured,
            1 => configured.max(Level::DEBUG),
            _ => Level::TRACE,
        }
    }

    /// Environment-derived configuration with command-line overrides applied.
    pub fn asset_config(&self) -> Result<AssetConfig, CliError> {
        let mut config = AssetConfig::from_env()?;
        if let Some(ms) = self.timeout_ms {
            if ms == 0 {
                return Err(CliError::Config("--timeout-ms must be greater than zero".into()));
            }
            config = config.with_request_timeout(Duration::from_millis(ms));
        }
        Ok(config)
    }
}

#[cfg(test)]
#[path = "config.test.rs"]
mod tests;
