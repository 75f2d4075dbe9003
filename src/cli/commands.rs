use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::flags::{Cli, Command};
use crate::config::definitions::{load_definitions, load_scoring};
use crate::config::load_config;
use crate::org::rest::RestClient;
use crate::pipeline::analyzer::{AnalysisResult, ScoringStrategy};
use crate::pipeline::manager::AnalyzerManager;
use crate::pipeline::reporter::{write_results, OutputFormat};

pub async fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref()).context("loading config")?;
    let definitions =
        load_definitions(&cfg.definitions_dir).context("loading product definitions")?;

    match cli.command {
        Command::Analyze {
            product,
            strategy,
            format,
            output,
        } => run_analyze(&cfg, &definitions, product, strategy, format, output).await,
        Command::List => run_list(&definitions),
    }
}

async fn run_analyze(
    cfg: &crate::config::AppConfig,
    definitions: &BTreeMap<String, crate::config::definitions::ProductDefinition>,
    product: Option<String>,
    strategy: ScoringStrategy,
    format: OutputFormat,
    output: PathBuf,
) -> Result<()> {
    let scoring = load_scoring(&cfg.scoring_path).context("loading scoring config")?;
    let client = RestClient::new(&cfg.org).context("building org client")?;
    let manager = AnalyzerManager::new(
        &client,
        definitions,
        &scoring,
        strategy,
        Duration::from_millis(cfg.org.probe_timeout_ms),
    );

    let results: BTreeMap<String, AnalysisResult> = match product {
        Some(key) => {
            let result = manager.analyze_product(&key).await?;
            BTreeMap::from([(key, result)])
        }
        None => manager.analyze_all().await,
    };

    write_results(&results, format, &output)?;
    info!("wrote {} product results to {}", results.len(), output.display());

    for (key, result) in &results {
        match &result.outcome {
            crate::pipeline::analyzer::Outcome::Score { score, category } => {
                println!("{}: {:.1}/100 ({}) edition={}", key, score, category, result.edition);
            }
            crate::pipeline::analyzer::Outcome::ImplementationStatus {
                implemented,
                not_implemented,
            } => {
                println!(
                    "{}: {} implemented, {} not implemented, edition={}",
                    key,
                    implemented.len(),
                    not_implemented.len(),
                    result.edition
                );
            }
        }
    }
    Ok(())
}

fn run_list(
    definitions: &BTreeMap<String, crate::config::definitions::ProductDefinition>,
) -> Result<()> {
    for (key, def) in definitions {
        let items: usize = def.indicators.iter().map(|c| c.items.len()).sum();
        println!(
            "{}: {} ({} categories, {} indicators)",
            key,
            def.name,
            def.indicators.len(),
            items
        );
    }
    Ok(())
}
