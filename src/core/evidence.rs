use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::time::now_utc;

/// High-level categorization for one unit of org observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EvidenceType {
    ObjectPresence,
    ObjectUsage,
    FeatureConfiguration,
    UserActivity,
    ApiUsage,
    CodeReferences,
}

impl EvidenceType {
    pub const ALL: [EvidenceType; 6] = [
        EvidenceType::ObjectPresence,
        EvidenceType::ObjectUsage,
        EvidenceType::FeatureConfiguration,
        EvidenceType::UserActivity,
        EvidenceType::ApiUsage,
        EvidenceType::CodeReferences,
    ];
}

/// Count against a configured threshold, shared by usage, activity and API
/// evidence. `count` and `threshold` are independently optional; the scorer
/// treats the two absences differently.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageStats {
    pub count: Option<u64>,
    pub threshold: Option<u64>,
    pub timeframe_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObjectDetails {
    /// Whether every required field was present; `None` when no required
    /// fields were requested. Does not affect `detected`.
    pub all_required_fields: Option<bool>,
    pub missing_fields: Vec<String>,
    pub record_count: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Usage sub-result composed in at construction time.
    pub usage: Option<UsageStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureDetails {
    /// Name of the detection method that matched first.
    pub method: Option<String>,
    pub matched: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CodeDetails {
    /// `None` means the probe could not enumerate matches, which the scorer
    /// treats as partial credit rather than zero.
    pub matches: Option<Vec<String>>,
}

/// Reason attached to every non-detected evidence record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureDetails {
    pub error: Option<String>,
    pub message: Option<String>,
}

/// Type-specific payload. Each variant carries only the fields its evidence
/// type actually uses, so the scoring dispatch stays exhaustive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceDetails {
    Object(ObjectDetails),
    Usage(UsageStats),
    Feature(FeatureDetails),
    Code(CodeDetails),
    Failure(FailureDetails),
}

/// One observed signal about org configuration or usage. Built once by the
/// collector and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub evidence_type: EvidenceType,
    pub name: String,
    pub detected: bool,
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
    pub details: EvidenceDetails,
}

impl Evidence {
    pub fn found(
        evidence_type: EvidenceType,
        name: impl Into<String>,
        weight: f64,
        details: EvidenceDetails,
    ) -> Self {
        Self {
            evidence_type,
            name: name.into(),
            detected: true,
            weight,
            timestamp: now_utc(),
            details,
        }
    }

    /// Non-detected evidence always carries a reason for audit.
    pub fn missed(
        evidence_type: EvidenceType,
        name: impl Into<String>,
        weight: f64,
        failure: FailureDetails,
    ) -> Self {
        Self {
            evidence_type,
            name: name.into(),
            detected: false,
            weight,
            timestamp: now_utc(),
            details: EvidenceDetails::Failure(failure),
        }
    }

    pub fn not_found(
        evidence_type: EvidenceType,
        name: impl Into<String>,
        weight: f64,
        message: impl Into<String>,
    ) -> Self {
        Self::missed(
            evidence_type,
            name,
            weight,
            FailureDetails {
                error: None,
                message: Some(message.into()),
            },
        )
    }

    pub fn probe_error(
        evidence_type: EvidenceType,
        name: impl Into<String>,
        weight: f64,
        error: impl Into<String>,
    ) -> Self {
        Self::missed(
            evidence_type,
            name,
            weight,
            FailureDetails {
                error: Some(error.into()),
                message: None,
            },
        )
    }

    /// Count/threshold view used by the scorer: usage evidence directly, or
    /// the usage sub-result merged into object evidence.
    pub fn usage_stats(&self) -> Option<&UsageStats> {
        match &self.details {
            EvidenceDetails::Usage(stats) => Some(stats),
            EvidenceDetails::Object(obj) => obj.usage.as_ref(),
            _ => None,
        }
    }

    pub fn code_matches(&self) -> Option<&[String]> {
        match &self.details {
            EvidenceDetails::Code(code) => code.matches.as_deref(),
            _ => None,
        }
    }
}

/// All evidence gathered for one product run, with a derived type index.
/// Write-once: populated by the analyzer, then read-only for scoring.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvidenceCollection {
    items: Vec<Evidence>,
    #[serde(skip)]
    by_type: BTreeMap<EvidenceType, Vec<usize>>,
}

impl EvidenceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, evidence: Evidence) {
        let idx = self.items.len();
        self.by_type
            .entry(evidence.evidence_type)
            .or_default()
            .push(idx);
        self.items.push(evidence);
    }

    pub fn items(&self) -> &[Evidence] {
        &self.items
    }

    pub fn of_type(&self, evidence_type: EvidenceType) -> impl Iterator<Item = &Evidence> {
        self.by_type
            .get(&evidence_type)
            .into_iter()
            .flatten()
            .map(move |idx| &self.items[*idx])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Names of detected feature-configuration evidence, used for edition
    /// inference.
    pub fn detected_feature_names(&self) -> Vec<&str> {
        self.of_type(EvidenceType::FeatureConfiguration)
            .filter(|ev| ev.detected)
            .map(|ev| ev.name.as_str())
            .collect()
    }
}
