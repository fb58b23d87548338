// grain-settlement CLI
// Parse one document or compute one quality result and print it as JSON.
// Logs go to stderr so stdout stays machine-readable.

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use grain_settlement::{
    CpeParser, MoistureRegistry, QualityAnalysis, QualityCalculationEngine, RuleSetRegistry,
    SettlementDocument, SettlementParser, SettlementValidator, ValidationContext,
    ValidatorConfig,
};

#[derive(Parser, Debug)]
#[command(name = "grain-settlement", version, about = "Grain settlement interpretation and quality pricing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a CPE from extracted text
    Cpe {
        /// Text file produced by the PDF extractor
        file: PathBuf,
    },

    /// Parse a settlement document (JSON)
    Settlement { file: PathBuf },

    /// Compute grade, factor and moisture loss for one lab analysis (JSON)
    Quality {
        analysis: PathBuf,

        /// Delivered kg
        #[arg(long)]
        quantity: f64,

        /// Rule sets JSON (defaults to the built-in rule sets)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Moisture tables CSV (defaults to the built-in tables)
        #[arg(long)]
        moisture: Option<PathBuf>,
    },

    /// Parse and validate a settlement document (JSON)
    Validate {
        file: PathBuf,

        /// Partial settlement this one closes (JSON)
        #[arg(long)]
        partial: Option<PathBuf>,

        /// Validator tolerances (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Reference date for pending-final checks (yyyy-mm-dd)
        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("grain_settlement=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Cpe { file } => run_cpe(&file),
        Command::Settlement { file } => run_settlement(&file),
        Command::Quality {
            analysis,
            quantity,
            rules,
            moisture,
        } => run_quality(&analysis, quantity, rules.as_deref(), moisture.as_deref()),
        Command::Validate {
            file,
            partial,
            config,
            today,
        } => run_validate(&file, partial.as_deref(), config.as_deref(), today),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_cpe(file: &Path) -> Result<()> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("Failed to read CPE text: {}", file.display()))?;

    let result = CpeParser::new().parse(&text);
    print_json(&result)?;

    if !result.success {
        bail!("CPE parse failed: {}", result.errors.join("; "));
    }
    Ok(())
}

fn run_settlement(file: &Path) -> Result<()> {
    let doc = SettlementDocument::from_json(file)?;
    let (settlement, warnings) = SettlementParser::new().parse(&doc);
    tracing::info!("{}", settlement.summary());
    print_json(&serde_json::json!({
        "settlement": settlement,
        "warnings": warnings,
    }))
}

fn run_quality(
    analysis: &Path,
    quantity: f64,
    rules: Option<&Path>,
    moisture: Option<&Path>,
) -> Result<()> {
    let content = fs::read_to_string(analysis)
        .with_context(|| format!("Failed to read analysis: {}", analysis.display()))?;
    let analysis: QualityAnalysis =
        serde_json::from_str(&content).context("Failed to parse analysis JSON")?;

    let rules = match rules {
        Some(path) => RuleSetRegistry::from_file(path)?,
        None => RuleSetRegistry::with_defaults(),
    };
    let moisture = match moisture {
        Some(path) => MoistureRegistry::from_csv(path)?,
        None => MoistureRegistry::with_defaults(),
    };

    let engine = QualityCalculationEngine::new(rules, moisture);
    let result = engine.calculate(&analysis, quantity)?;
    tracing::info!("{}", result.summary());
    print_json(&result)
}

fn run_validate(
    file: &Path,
    partial: Option<&Path>,
    config: Option<&Path>,
    today: Option<NaiveDate>,
) -> Result<()> {
    let config = match config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read validator config: {}", path.display()))?;
            serde_json::from_str::<ValidatorConfig>(&content)
                .context("Failed to parse validator config")?
        }
        None => ValidatorConfig::default(),
    };

    let parser = SettlementParser::with_config(&config);

    let (settlement, warnings) = parser.parse(&SettlementDocument::from_json(file)?);
    let linked_partial = match partial {
        Some(path) => Some(parser.parse(&SettlementDocument::from_json(path)?).0),
        None => None,
    };

    let context = ValidationContext {
        linked_partial: linked_partial.as_ref(),
        ..Default::default()
    };

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let result = SettlementValidator::with_config(config).validate_all(&settlement, &context, today);
    tracing::info!(coe = %settlement.coe, "{}", result.summary());

    print_json(&serde_json::json!({
        "settlement": settlement,
        "warnings": warnings,
        "validation": result,
    }))
}
