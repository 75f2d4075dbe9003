use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::definitions::{ProductDefinition, ScoringConfig};
use crate::core::evidence::{Evidence, EvidenceCollection, EvidenceType, UsageStats};
use crate::core::time::now_utc;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Discrete usage classification derived from the continuous score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UsageCategory {
    Active,
    Limited,
    Inactive,
    NotUsed,
}

impl fmt::Display for UsageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UsageCategory::Active => "Active",
            UsageCategory::Limited => "Limited",
            UsageCategory::Inactive => "Inactive",
            UsageCategory::NotUsed => "Not Used",
        };
        f.write_str(label)
    }
}

/// Turns an evidence collection into a 0-100 score, a usage category and a
/// detected edition. Never fails: empty or weightless input scores 0.
pub struct ScoringEngine<'a> {
    config: &'a ScoringConfig,
}

impl<'a> ScoringEngine<'a> {
    pub fn new(config: &'a ScoringConfig) -> Self {
        Self { config }
    }

    /// Weighted, time-decayed aggregation over every evidence type that has
    /// a configured weight. Evidence of unweighted types contributes nothing.
    pub fn calculate_score(&self, collection: &EvidenceCollection) -> f64 {
        let mut total_score = 0.0;
        let mut total_weight = 0.0;

        for (evidence_type, type_weight) in &self.config.evidence_weights {
            for item in collection.of_type(*evidence_type) {
                let base = self.item_score(item);
                let decayed = self.apply_time_decay(base, item);
                total_score += decayed * type_weight * item.weight;
                total_weight += item.weight * type_weight;
            }
        }

        if total_weight == 0.0 {
            return 0.0;
        }
        (total_score / total_weight * 100.0).clamp(0.0, 100.0)
    }

    /// Per-item base score in [0,1], dispatched on the evidence type.
    pub fn item_score(&self, item: &Evidence) -> f64 {
        if !item.detected {
            return 0.0;
        }
        match item.evidence_type {
            // Presence alone is binary; presence with a merged usage
            // sub-result is scored like usage.
            EvidenceType::ObjectPresence => match item.usage_stats() {
                Some(stats) => usage_score(stats),
                None => 1.0,
            },
            EvidenceType::ObjectUsage
            | EvidenceType::UserActivity
            | EvidenceType::ApiUsage => match item.usage_stats() {
                Some(stats) => usage_score(stats),
                None => 0.5,
            },
            EvidenceType::FeatureConfiguration => 1.0,
            EvidenceType::CodeReferences => match item.code_matches() {
                None => 0.5,
                Some(matches) => (matches.len() as f64 / 3.0).min(1.0),
            },
        }
    }

    /// Linear decay: evidence loses `rate` of its value per day of age and
    /// bottoms out at zero. Rate 0 disables decay. Future-dated evidence
    /// (clock skew) counts at full value, never amplified.
    pub fn apply_time_decay(&self, score: f64, item: &Evidence) -> f64 {
        let rate = self.config.decay_factors.rate;
        if rate == 0.0 {
            return score;
        }
        let age_ms = (now_utc() - item.timestamp).num_milliseconds() as f64;
        let age_days = age_ms / MS_PER_DAY;
        let decay_factor = (1.0 - age_days * rate).clamp(0.0, 1.0);
        score * decay_factor
    }

    /// First threshold met from highest to lowest wins; boundary scores
    /// belong to the higher band.
    pub fn categorize(&self, score: f64) -> UsageCategory {
        let t = &self.config.thresholds;
        if score >= t.active {
            UsageCategory::Active
        } else if score >= t.limited {
            UsageCategory::Limited
        } else if score >= t.inactive {
            UsageCategory::Inactive
        } else {
            UsageCategory::NotUsed
        }
    }

    /// Edition inference from detected feature names. Signals match by
    /// case-sensitive substring containment, a known precision limitation
    /// ("SSO" also matches "SSOExtended") kept for compatibility with the
    /// definition corpus.
    pub fn determine_edition(
        &self,
        definition: &ProductDefinition,
        collection: &EvidenceCollection,
    ) -> String {
        if definition.edition_signals.is_empty() {
            return "Unknown".to_string();
        }
        let features = collection.detected_feature_names();

        // Definitions list editions low to high; check high to low.
        for candidate in definition.edition_signals.iter().rev() {
            if candidate.signals.is_empty() {
                continue;
            }
            let matched = candidate
                .signals
                .iter()
                .filter(|signal| features.iter().any(|f| f.contains(signal.as_str())))
                .count();
            let required = candidate.signals.len().div_ceil(2);
            if matched >= required {
                return candidate.edition.clone();
            }
        }

        definition
            .edition_signals
            .first()
            .map(|e| e.edition.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Fixed four-tier piecewise rule shared by usage, activity and API
/// evidence. An undefined count and an undefined threshold are deliberately
/// not equivalent.
fn usage_score(stats: &UsageStats) -> f64 {
    let Some(count) = stats.count else {
        return 0.5;
    };
    let Some(threshold) = stats.threshold else {
        return 1.0;
    };
    if threshold == 0 || count >= 2 * threshold {
        1.0
    } else if count >= threshold {
        0.75
    } else {
        (count as f64 / threshold as f64) * 0.5
    }
}
