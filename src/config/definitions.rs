use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use tracing::debug;

use crate::core::error::ScanError;
use crate::core::evidence::EvidenceType;
use crate::core::hash::definition_fingerprint;

/// Declarative description of one cloud product: what to probe for, how to
/// weigh it, and which feature names signal which edition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub indicators: Vec<IndicatorCategory>,
    /// Declared low edition first; the engine checks high to low.
    #[serde(default, deserialize_with = "ordered_signal_map")]
    pub edition_signals: Vec<EditionSignals>,
    #[serde(default)]
    pub findings_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorCategory {
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub items: Vec<IndicatorItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndicatorKind {
    Object,
    Feature,
    Activity,
    Api,
    Integration,
    Code,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IndicatorKind::Object => "object",
            IndicatorKind::Feature => "feature",
            IndicatorKind::Activity => "activity",
            IndicatorKind::Api => "api",
            IndicatorKind::Integration => "integration",
            IndicatorKind::Code => "code",
            IndicatorKind::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorItem {
    #[serde(rename = "type")]
    pub kind: IndicatorKind,
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub detection_methods: Vec<DetectionMethod>,
    #[serde(default)]
    pub activity_threshold: Option<u64>,
    #[serde(default)]
    pub timeframe: Option<String>,
    /// Target object for activity/api probes when it differs from `name`.
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub trigger_object: Option<String>,
    #[serde(default)]
    pub code_type: Option<String>,
    #[serde(default)]
    pub additional_where: Option<String>,
}

/// One concrete technique for testing an indicator. Methods are tried in
/// declaration order and the first success wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DetectionMethod {
    #[serde(rename_all = "camelCase")]
    Metadata {
        path: String,
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        min_count: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Field {
        object: String,
        name: String,
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        value: Option<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    Object {
        object: String,
        #[serde(default)]
        min_count: Option<u64>,
        #[serde(default)]
        required_fields: Vec<String>,
    },
}

impl DetectionMethod {
    pub fn label(&self) -> &'static str {
        match self {
            DetectionMethod::Metadata { .. } => "metadata",
            DetectionMethod::Field { .. } => "field",
            DetectionMethod::Object { .. } => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditionSignals {
    pub edition: String,
    pub signals: Vec<String>,
}

/// Scoring knobs. All three sections are mandatory; a missing section is a
/// configuration error, not a runtime default.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringConfig {
    pub evidence_weights: BTreeMap<EvidenceType, f64>,
    pub decay_factors: DecayFactors,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecayFactors {
    /// Linear decay per day of evidence age; 0.01 zeroes evidence at 100 days.
    pub rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    pub active: f64,
    pub limited: f64,
    pub inactive: f64,
}

pub fn load_scoring(path: &Path) -> Result<ScoringConfig, ScanError> {
    let content = fs::read_to_string(path).map_err(|e| {
        ScanError::Config(format!("scoring config {}: {}", path.display(), e))
    })?;
    let cfg: ScoringConfig = serde_json::from_str(&content).map_err(|e| {
        ScanError::Config(format!("scoring config {}: {}", path.display(), e))
    })?;
    validate_scoring(&cfg)?;
    Ok(cfg)
}

pub fn validate_scoring(cfg: &ScoringConfig) -> Result<(), ScanError> {
    if cfg.evidence_weights.is_empty() {
        return Err(ScanError::Config("evidenceWeights must not be empty".into()));
    }
    if cfg.decay_factors.rate < 0.0 {
        return Err(ScanError::Config("decayFactors.rate must be >= 0".into()));
    }
    let t = &cfg.thresholds;
    let in_range = |v: f64| (0.0..=100.0).contains(&v);
    if !in_range(t.active) || !in_range(t.limited) || !in_range(t.inactive) {
        return Err(ScanError::Config("thresholds must lie in [0,100]".into()));
    }
    if !(t.active >= t.limited && t.limited >= t.inactive) {
        return Err(ScanError::Config(
            "thresholds must satisfy active >= limited >= inactive".into(),
        ));
    }
    Ok(())
}

/// Load every `<product>.json` under `dir` (the scoring config file is
/// skipped), keyed by file stem.
pub fn load_definitions(dir: &Path) -> Result<BTreeMap<String, ProductDefinition>, ScanError> {
    let mut out = BTreeMap::new();
    let entries = fs::read_dir(dir).map_err(|e| {
        ScanError::Config(format!("definitions dir {}: {}", dir.display(), e))
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| ScanError::Config(e.to_string()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) if s != "scoring" => s.to_string(),
            _ => continue,
        };
        let content =
            fs::read_to_string(&path).map_err(|e| ScanError::Config(e.to_string()))?;
        let raw: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            ScanError::Config(format!("definition {}: {}", path.display(), e))
        })?;
        let def: ProductDefinition = serde_json::from_value(raw.clone()).map_err(|e| {
            ScanError::Config(format!("definition {}: {}", path.display(), e))
        })?;
        validate_definition(&stem, &def)?;
        debug!(
            "loaded definition {} ({})",
            stem,
            &definition_fingerprint(&raw)[..12]
        );
        out.insert(stem, def);
    }
    if out.is_empty() {
        return Err(ScanError::Config(format!(
            "no product definitions in {}",
            dir.display()
        )));
    }
    Ok(out)
}

pub fn validate_definition(key: &str, def: &ProductDefinition) -> Result<(), ScanError> {
    if def.indicators.is_empty() {
        return Err(ScanError::Config(format!(
            "product {}: at least one indicator category required",
            key
        )));
    }
    for category in &def.indicators {
        if category.items.is_empty() {
            return Err(ScanError::Config(format!(
                "product {}: category '{}' has no items",
                key, category.category
            )));
        }
        for item in &category.items {
            if item.name.trim().is_empty() {
                return Err(ScanError::Config(format!(
                    "product {}: item in '{}' is missing a name",
                    key, category.category
                )));
            }
        }
    }
    Ok(())
}

fn default_weight() -> f64 {
    1.0
}

/// JSON objects lose key order through a plain map type; edition inference
/// depends on declared order, so deserialize entries into a Vec directly.
fn ordered_signal_map<'de, D>(deserializer: D) -> Result<Vec<EditionSignals>, D::Error>
where
    D: Deserializer<'de>,
{
    struct SignalMapVisitor;

    impl<'de> Visitor<'de> for SignalMapVisitor {
        type Value = Vec<EditionSignals>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map of edition name to signal list")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some((edition, signals)) = access.next_entry::<String, Vec<String>>()? {
                out.push(EditionSignals { edition, signals });
            }
            Ok(out)
        }
    }

    deserializer.deserialize_map(SignalMapVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edition_signals_preserve_declared_order() {
        let json = r#"{
            "name": "Service Cloud",
            "indicators": [
                {"category": "Core Objects", "items": [{"type": "object", "name": "Case"}]}
            ],
            "editionSignals": {
                "Professional": ["Case"],
                "Enterprise": ["Omni-Channel", "Entitlement"],
                "Unlimited": ["Einstein", "Omni-Channel", "LiveAgent", "Knowledge"]
            }
        }"#;
        let def: ProductDefinition = serde_json::from_str(json).unwrap();
        let order: Vec<&str> = def
            .edition_signals
            .iter()
            .map(|e| e.edition.as_str())
            .collect();
        assert_eq!(order, vec!["Professional", "Enterprise", "Unlimited"]);
    }

    #[test]
    fn unknown_indicator_kind_parses_as_unknown() {
        let json = r#"{"type": "hologram", "name": "X"}"#;
        let item: IndicatorItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.kind, IndicatorKind::Unknown);
        assert_eq!(item.weight, 1.0);
    }

    #[test]
    fn scoring_thresholds_must_be_monotonic() {
        let cfg = ScoringConfig {
            evidence_weights: [(crate::core::evidence::EvidenceType::ObjectPresence, 1.0)]
                .into_iter()
                .collect(),
            decay_factors: DecayFactors { rate: 0.01 },
            thresholds: Thresholds {
                active: 40.0,
                limited: 60.0,
                inactive: 10.0,
            },
        };
        assert!(validate_scoring(&cfg).is_err());
    }

    #[test]
    fn empty_category_is_rejected() {
        let def = ProductDefinition {
            name: "X".into(),
            description: String::new(),
            indicators: vec![IndicatorCategory {
                category: "Empty".into(),
                description: String::new(),
                items: vec![],
            }],
            edition_signals: vec![],
            findings_map: BTreeMap::new(),
        };
        assert!(validate_definition("x", &def).is_err());
    }
}
