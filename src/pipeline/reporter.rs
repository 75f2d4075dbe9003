use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::pipeline::analyzer::{AnalysisResult, Outcome};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Markdown,
}

pub fn write_results(
    results: &BTreeMap<String, AnalysisResult>,
    format: OutputFormat,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    match format {
        OutputFormat::Json => write_json(results, path),
        OutputFormat::Jsonl => write_jsonl(results, path),
        OutputFormat::Markdown => write_markdown(results, path),
    }
}

fn write_json(results: &BTreeMap<String, AnalysisResult>, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    fs::write(path, json)?;
    Ok(())
}

fn write_jsonl(results: &BTreeMap<String, AnalysisResult>, path: &Path) -> Result<()> {
    let mut out = String::new();
    for (key, result) in results {
        let record = serde_json::json!({ "product": key, "result": result });
        out.push_str(&serde_json::to_string(&record)?);
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}

fn write_markdown(results: &BTreeMap<String, AnalysisResult>, path: &Path) -> Result<()> {
    let mut out = String::new();
    out.push_str("# Org Product Usage Report\n\n");
    if results.is_empty() {
        out.push_str("No products analyzed.\n");
    }
    for result in results.values() {
        out.push_str(&format!("## {}\n", result.product_name));
        match &result.outcome {
            Outcome::Score { score, category } => {
                out.push_str(&format!("- Score: {:.1}/100\n", score));
                out.push_str(&format!("- Usage: {}\n", category));
            }
            Outcome::ImplementationStatus {
                implemented,
                not_implemented,
            } => {
                out.push_str(&format!("- Implemented: {}\n", join_or_none(implemented)));
                out.push_str(&format!(
                    "- Not implemented: {}\n",
                    join_or_none(not_implemented)
                ));
            }
        }
        out.push_str(&format!("- Edition: {}\n", result.edition));
        out.push('\n');
        out.push_str("### Evidence\n");
        for summary in &result.evidence_summary {
            out.push_str(&format!(
                "- {}: {}/{} detected ({})\n",
                summary.category,
                summary.detected.len(),
                summary.total_items,
                join_or_none(&summary.detected)
            ));
        }
        out.push('\n');
        if !result.significant_findings.is_empty() {
            out.push_str("### Findings\n");
            for finding in &result.significant_findings {
                out.push_str(&format!("- {}\n", finding));
            }
            out.push('\n');
        }
    }
    fs::write(path, out)?;
    Ok(())
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "none".to_string()
    } else {
        values.join(", ")
    }
}
