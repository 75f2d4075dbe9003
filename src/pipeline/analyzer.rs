use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::definitions::{IndicatorItem, IndicatorKind, ProductDefinition, ScoringConfig};
use crate::core::evidence::{Evidence, EvidenceCollection, EvidenceType};
use crate::core::time::now_utc;
use crate::pipeline::collector::{parse_timeframe, EvidenceCollector, ObjectCheck, UsageProbe};
use crate::pipeline::scorer::{ScoringEngine, UsageCategory};

/// How a product run is summarized: a probability score with a usage band,
/// or a flat implemented / not-implemented partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ScoringStrategy {
    #[default]
    Probability,
    ImplementationStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "strategy", rename_all = "camelCase")]
pub enum Outcome {
    #[serde(rename_all = "camelCase")]
    Score { score: f64, category: UsageCategory },
    #[serde(rename_all = "camelCase")]
    ImplementationStatus {
        implemented: Vec<String>,
        not_implemented: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category: String,
    pub total_items: usize,
    pub detected: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub product_name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub edition: String,
    pub evidence_summary: Vec<CategorySummary>,
    pub significant_findings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Runs one full product evaluation: walk the definition's indicator
/// categories, probe the org through the collector, then score and package.
pub struct ProductAnalyzer<'a> {
    collector: &'a EvidenceCollector<'a>,
    definition: &'a ProductDefinition,
    scoring: &'a ScoringConfig,
    strategy: ScoringStrategy,
}

impl<'a> ProductAnalyzer<'a> {
    pub fn new(
        collector: &'a EvidenceCollector<'a>,
        definition: &'a ProductDefinition,
        scoring: &'a ScoringConfig,
        strategy: ScoringStrategy,
    ) -> Self {
        Self {
            collector,
            definition,
            scoring,
            strategy,
        }
    }

    pub async fn analyze(&self) -> AnalysisResult {
        let mut collection = EvidenceCollection::new();

        for category in &self.definition.indicators {
            info!(
                "probing {} / {} ({} items)",
                self.definition.name,
                category.category,
                category.items.len()
            );
            for item in &category.items {
                if let Some(evidence) = self.probe_item(item).await {
                    collection.push(evidence);
                }
            }
        }

        let engine = ScoringEngine::new(self.scoring);
        let outcome = match self.strategy {
            ScoringStrategy::Probability => {
                let score = engine.calculate_score(&collection);
                Outcome::Score {
                    score,
                    category: engine.categorize(score),
                }
            }
            ScoringStrategy::ImplementationStatus => partition_implementation(&collection),
        };
        let edition = engine.determine_edition(self.definition, &collection);

        AnalysisResult {
            product_name: self.definition.name.clone(),
            outcome,
            edition,
            evidence_summary: self.summarize(&collection),
            significant_findings: self.generate_findings(&collection),
            timestamp: now_utc(),
        }
    }

    /// Dispatch one indicator item to the matching probe. Unknown item
    /// kinds are skipped with a warning, not an error.
    async fn probe_item(&self, item: &IndicatorItem) -> Option<Evidence> {
        let evidence = match item.kind {
            IndicatorKind::Object => {
                let usage = item.activity_threshold.map(|threshold| UsageProbe {
                    timeframe: parse_timeframe(item.timeframe.as_deref()),
                    threshold: Some(threshold),
                    additional_where: item.additional_where.as_deref(),
                });
                self.collector
                    .check_object(
                        &item.name,
                        item.weight,
                        ObjectCheck {
                            required_fields: &item.required_fields,
                            check_record_count: true,
                            check_last_modified: true,
                            usage,
                        },
                    )
                    .await
            }
            IndicatorKind::Feature => {
                self.collector
                    .check_feature(&item.name, item.weight, &item.detection_methods)
                    .await
            }
            IndicatorKind::Activity => self.collector.check_user_activity(item).await,
            IndicatorKind::Api | IndicatorKind::Integration => {
                if item.detection_methods.is_empty() {
                    self.collector.check_api_usage(item).await
                } else {
                    self.collector
                        .check_feature(&item.name, item.weight, &item.detection_methods)
                        .await
                }
            }
            IndicatorKind::Code => {
                if item.detection_methods.is_empty() {
                    self.collector.check_code_references(item).await
                } else {
                    self.collector
                        .check_feature(&item.name, item.weight, &item.detection_methods)
                        .await
                }
            }
            IndicatorKind::Unknown => {
                warn!(
                    "skipping item '{}' in {}: unknown indicator type",
                    item.name, self.definition.name
                );
                return None;
            }
        };
        Some(evidence)
    }

    /// Human-readable findings: canned strings from the definition's
    /// findings map where present, generic templates otherwise, plus
    /// aggregate code-customization and engagement findings.
    fn generate_findings(&self, collection: &EvidenceCollection) -> Vec<String> {
        let mut findings = Vec::new();

        for ev in collection.of_type(EvidenceType::ObjectPresence) {
            if !ev.detected {
                continue;
            }
            let finding = self
                .definition
                .findings_map
                .get(&ev.name)
                .cloned()
                .unwrap_or_else(|| format!("{} is being used", ev.name));
            findings.push(finding);
        }

        for ev in collection.of_type(EvidenceType::FeatureConfiguration) {
            if !ev.detected {
                continue;
            }
            let finding = self
                .definition
                .findings_map
                .get(&ev.name)
                .cloned()
                .unwrap_or_else(|| format!("{} is configured", ev.name));
            findings.push(finding);
        }

        let code_matches: usize = collection
            .of_type(EvidenceType::CodeReferences)
            .filter(|ev| ev.detected)
            .map(|ev| ev.code_matches().map(|m| m.len()).unwrap_or(1))
            .sum();
        if code_matches > 0 {
            findings.push(format!(
                "{} Apex customizations reference {} objects",
                code_matches, self.definition.name
            ));
        }

        let engaged = [EvidenceType::UserActivity, EvidenceType::ObjectUsage]
            .into_iter()
            .flat_map(|t| collection.of_type(t))
            .any(|ev| {
                ev.detected
                    && ev
                        .usage_stats()
                        .and_then(|u| Some(u.count? >= u.threshold?))
                        .unwrap_or(false)
            });
        if engaged {
            findings.push("Active user engagement detected".to_string());
        }

        findings
    }

    /// Group detected evidence under the category that declared an item of
    /// the same name.
    fn summarize(&self, collection: &EvidenceCollection) -> Vec<CategorySummary> {
        self.definition
            .indicators
            .iter()
            .map(|category| {
                let detected: Vec<String> = collection
                    .items()
                    .iter()
                    .filter(|ev| {
                        ev.detected
                            && category.items.iter().any(|item| item.name == ev.name)
                    })
                    .map(|ev| ev.name.clone())
                    .collect();
                CategorySummary {
                    category: category.category.clone(),
                    total_items: category.items.len(),
                    detected,
                }
            })
            .collect()
    }
}

fn partition_implementation(collection: &EvidenceCollection) -> Outcome {
    let mut implemented = Vec::new();
    let mut not_implemented = Vec::new();
    for ev in collection.items() {
        if ev.detected {
            implemented.push(ev.name.clone());
        } else {
            not_implemented.push(ev.name.clone());
        }
    }
    implemented.sort();
    implemented.dedup();
    not_implemented.sort();
    not_implemented.dedup();
    // an indicator detected anywhere is implemented, full stop
    not_implemented.retain(|name| !implemented.contains(name));
    Outcome::ImplementationStatus {
        implemented,
        not_implemented,
    }
}
