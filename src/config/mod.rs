use std::{fs, path::{Path, PathBuf}};

use serde::Deserialize;

use crate::core::error::ScanError;

pub mod definitions;

// a top-level key misplaced under [org] must fail at load, not be dropped
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrgConfig {
    pub instance_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Bearer token for the org. Overridden by ORGLENS_ACCESS_TOKEN when set.
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Per-probe budget; a slow probe degrades to non-detected evidence
    /// instead of stalling the whole product run.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub org: OrgConfig,
    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: PathBuf,
    #[serde(default = "default_scoring_path")]
    pub scoring_path: PathBuf,
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ScanError> {
    let default_path = Path::new("config/orglens.toml");
    let path = path.unwrap_or(default_path);

    if !path.exists() {
        return Err(ScanError::Config(format!(
            "config file not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(path).map_err(|e| ScanError::Config(e.to_string()))?;
    let mut cfg: AppConfig =
        toml::from_str(&content).map_err(|e| ScanError::Config(e.to_string()))?;

    if let Ok(token) = std::env::var("ORGLENS_ACCESS_TOKEN") {
        cfg.org.access_token = token;
    }
    if cfg.org.access_token.is_empty() {
        return Err(ScanError::Config(
            "no access token: set org.access_token or ORGLENS_ACCESS_TOKEN".into(),
        ));
    }
    Ok(cfg)
}

fn default_api_version() -> String {
    "59.0".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_probe_timeout_ms() -> u64 {
    15_000
}

fn default_definitions_dir() -> PathBuf {
    PathBuf::from("definitions")
}

fn default_scoring_path() -> PathBuf {
    PathBuf::from("definitions/scoring.json")
}
