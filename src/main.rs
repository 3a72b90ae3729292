mod cli;

use anyhow::Result;
use clap::Parser;
use difftrace_assets::{AttentionKind, Dataset, DatasetLoader, MapKey, logging};
use serde::Serialize;
use tracing::info;

use crate::cli::{
    CliConfig, CliError, config::{Command, OutputFormat}, report::{DivergenceReport, MapSummary, ValidationReport}
};

fn main() -> Result<()> {
    let cli = CliConfig::parse();
    let config = cli.asset_config()?;
    logging::init_tracing(cli.log_level(config.log_level));
    info!(dataset = cli.dataset(), timeout_ms = config.request_timeout.as_millis() as u64, "starting difftrace");

    let loader = DatasetLoader::new(config);
    match &cli.command {
        Command::Validate { dataset, strict } => validate(&loader, dataset, *strict, cli.output_format),
        Command::Inspect {
            dataset,
            layer,
            step,
            token,
            self_attention,
        } => {
            let dataset = loader.open(dataset)?;
            let summary = inspect(&dataset, layer, *step, if *self_attention { None } else { *token })?;
            emit(&summary, cli.output_format)
        }
        Command::Divergence {
            dataset,
            layer,
            step_a,
            step_b,
            token,
        } => {
            let dataset = loader.open(dataset)?;
            let left = dataset.load_cross_token_map(layer, *step_a, *token)?;
            let right = dataset.load_cross_token_map(layer, *step_b, *token)?;
            let divergence = dataset.compute_divergence(
                left.as_ref().map(|loaded| loaded.map.as_ref()),
                right.as_ref().map(|loaded| loaded.map.as_ref()),
            )?;
            let report = DivergenceReport {
                layer: layer.clone(),
                token: *token,
                step_a: *step_a,
                step_b: *step_b,
                divergence,
            };
            emit(&report, cli.output_format)
        }
    }
}

fn validate(loader: &DatasetLoader, location: &str, strict: bool, format: OutputFormat) -> Result<()> {
    let mut report = ValidationReport::new(location);
    match loader.open(location) {
        Ok(dataset) => {
            report.warnings.extend(dataset.warnings().iter().cloned());
            report
                .errors
                .extend(dataset.validate_attention_assets().iter().map(ToString::to_string));
        }
        Err(err) => report.errors.push(err.to_string()),
    }

    emit(&report, format)?;
    if !report.passed(strict) {
        return Err(CliError::ValidationFailed {
            errors: report.errors.len(),
            warnings: report.warnings.len(),
        }
        .into());
    }
    if format == OutputFormat::Text {
        println!("validation: passed");
    }
    Ok(())
}

fn inspect(dataset: &Dataset, layer: &str, step: u32, token: Option<usize>) -> Result<MapSummary, CliError> {
    let (kind, loaded) = match token {
        Some(token) => (AttentionKind::Cross, dataset.load_cross_token_map(layer, step, token)?),
        None => (AttentionKind::SelfAttention, dataset.load_self_map(layer, step)?),
    };
    let Some(loaded) = loaded else {
        return Err(CliError::MissingAttention {
            kind: kind.as_str(),
            layer: layer.to_string(),
            step,
        });
    };

    let entropy = dataset.compute_map_entropy(Some(loaded.map.as_ref()))?;
    let key = match loaded.token_index {
        Some(token) => MapKey::cross(layer, step, token),
        None => MapKey::self_attention(layer, step),
    };
    Ok(MapSummary::from_map(key.to_string(), &loaded.map, entropy))
}

fn emit<T: Serialize + std::fmt::Display>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let text = value.to_string();
            println!("{}", text.trim_end());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
