use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{error, info};

use crate::config::definitions::{
    validate_definition, ProductDefinition, ScoringConfig,
};
use crate::core::error::ScanError;
use crate::org::OrgClient;
use crate::pipeline::analyzer::{AnalysisResult, ProductAnalyzer, ScoringStrategy};
use crate::pipeline::collector::EvidenceCollector;

/// Fans a product analysis out across every configured product key.
/// Products run sequentially so probe logs stay readable; each product's
/// failure is isolated from its siblings.
pub struct AnalyzerManager<'a> {
    client: &'a dyn OrgClient,
    definitions: &'a BTreeMap<String, ProductDefinition>,
    scoring: &'a ScoringConfig,
    strategy: ScoringStrategy,
    probe_timeout: Duration,
}

impl<'a> AnalyzerManager<'a> {
    pub fn new(
        client: &'a dyn OrgClient,
        definitions: &'a BTreeMap<String, ProductDefinition>,
        scoring: &'a ScoringConfig,
        strategy: ScoringStrategy,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            client,
            definitions,
            scoring,
            strategy,
            probe_timeout,
        }
    }

    pub async fn analyze_product(&self, key: &str) -> Result<AnalysisResult, ScanError> {
        let definition = self
            .definitions
            .get(key)
            .ok_or_else(|| ScanError::UnknownProduct(key.to_string()))?;
        validate_definition(key, definition)?;

        let collector = EvidenceCollector::new(self.client, self.probe_timeout);
        let analyzer = ProductAnalyzer::new(&collector, definition, self.scoring, self.strategy);
        info!("analyzing {}", definition.name);
        Ok(analyzer.analyze().await)
    }

    /// A configuration error in one product aborts only that product; the
    /// rest of the run continues.
    pub async fn analyze_all(&self) -> BTreeMap<String, AnalysisResult> {
        let mut results = BTreeMap::new();
        for key in self.definitions.keys() {
            match self.analyze_product(key).await {
                Ok(result) => {
                    results.insert(key.clone(), result);
                }
                Err(err) => {
                    error!("skipping product {}: {}", key, err);
                }
            }
        }
        results
    }
}
