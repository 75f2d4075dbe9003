use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::pipeline::analyzer::ScoringStrategy;
use crate::pipeline::reporter::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "orglens",
    version,
    about = "Evidence-weighted Salesforce product usage detection"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path. Default: config/orglens.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (info, debug, trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log file path
    #[arg(long, default_value = "data/orglens.log")]
    pub log_file: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze configured products against the org
    Analyze {
        /// Restrict to one product key (file stem of its definition)
        #[arg(long)]
        product: Option<String>,

        /// Result shape
        #[arg(long, value_enum, default_value = "probability")]
        strategy: ScoringStrategy,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Output path
        #[arg(long, default_value = "out/analysis.json")]
        output: PathBuf,
    },
    /// List configured product definitions
    List,
}
