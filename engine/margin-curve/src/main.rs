use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use margin_curve::{
    evaluate_many, ConfidenceStrategy, CurveFit, CurveFitter, CurveSnapshot, FitReport,
    MarginBounds, MarginCurveConfig, PriceRequest, TransactionRecord,
};

/// Margin curve fitting and price suggestion
#[derive(Parser)]
#[command(name = "margin-curve")]
#[command(about = "Fit per-category price curves and suggest margin-bounded prices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit curves from a JSON array of transaction records
    Fit {
        /// Transaction records (JSON array)
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the fit report; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Confidence level for parameter intervals
        #[arg(long)]
        confidence: Option<f64>,
    },
    /// Suggest prices for a JSON array of requests
    Suggest {
        /// Fit report, or plain JSON array of curves
        #[arg(short, long)]
        curves: PathBuf,

        /// Price requests (JSON array)
        #[arg(short, long)]
        input: PathBuf,

        /// Strategy for requests that do not name one
        #[arg(long)]
        strategy: Option<String>,

        #[arg(long)]
        min_margin: Option<f64>,

        #[arg(long)]
        max_margin: Option<f64>,

        /// Where to write the suggestions; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = MarginCurveConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Fit { input, output, confidence } => {
            if let Some(confidence) = confidence {
                config.fitter.confidence_level = confidence;
            }
            config.validate()?;

            let records: Vec<TransactionRecord> = read_json(&input)?;
            info!("Loaded {} transaction records from {:?}", records.len(), input);

            let report = CurveFitter::new(config.fitter).fit(&records)?;
            for (category, reason) in &report.skipped {
                warn!("Category {} was not fitted: {}", category, reason);
            }

            write_json(output.as_deref(), &report)?;
        }
        Commands::Suggest { curves, input, strategy, min_margin, max_margin, output } => {
            if let Some(min_margin) = min_margin {
                config.margins.min_margin = min_margin;
            }
            if let Some(max_margin) = max_margin {
                config.margins.max_margin = max_margin;
            }
            let bounds = MarginBounds::new(config.margins.min_margin, config.margins.max_margin)?;

            let snapshot = load_snapshot(&curves)?;
            info!("Loaded {} category curves from {:?}", snapshot.len(), curves);

            let mut requests: Vec<PriceRequest> = read_json(&input)?;
            if let Some(strategy) = strategy {
                let strategy = ConfidenceStrategy::parse(&strategy);
                for request in requests.iter_mut().filter(|r| r.strategy == ConfidenceStrategy::Default) {
                    request.strategy = strategy;
                }
            }

            let results: Vec<serde_json::Value> = evaluate_many(&requests, &snapshot, &bounds)
                .into_iter()
                .map(|result| match result {
                    Ok(suggestion) => serde_json::to_value(suggestion),
                    Err(e) => Ok(serde_json::json!({ "error": e.to_string(), "detail": e })),
                })
                .collect::<Result<_, _>>()?;

            let failed = results.iter().filter(|r| r.get("error").is_some()).count();
            info!("Suggested {} prices, {} requests failed", results.len() - failed, failed);

            write_json(output.as_deref(), &results)?;
        }
    }

    Ok(())
}

/// Accept either a full fit report or a bare list of curves
fn load_snapshot(path: &Path) -> anyhow::Result<CurveSnapshot> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    if let Ok(report) = serde_json::from_str::<FitReport>(&content) {
        return Ok(report.into());
    }
    let curves: Vec<CurveFit> = serde_json::from_str(&content)
        .with_context(|| format!("{:?} is neither a fit report nor a list of curves", path))?;
    Ok(curves.into_iter().collect())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
}

fn write_json<T: serde::Serialize>(path: Option<&Path>, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
            info!("Wrote {:?}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}
