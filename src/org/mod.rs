use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::ScanError;

pub mod rest;

pub use rest::RestClient;

/// Shape shared by the REST and Tooling query endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(rename = "totalSize", default)]
    pub total_size: u64,
    #[serde(default)]
    pub records: Vec<serde_json::Value>,
}

impl QueryResult {
    pub fn record_str(&self, index: usize, field: &str) -> Option<&str> {
        self.records.get(index)?.get(field)?.as_str()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDescribe {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectDescribe {
    pub name: String,
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub fields: Vec<FieldDescribe>,
}

impl ObjectDescribe {
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}

/// One entry from a metadata listing. Pattern-based detection methods match
/// against whichever of these candidate fields are populated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataRecord {
    #[serde(alias = "fullName", alias = "Name", default)]
    pub name: Option<String>,
    #[serde(alias = "Url", default)]
    pub url: Option<String>,
    #[serde(alias = "Domain", default)]
    pub domain: Option<String>,
}

impl MetadataRecord {
    pub fn candidate_fields(&self) -> impl Iterator<Item = &str> {
        [self.name.as_deref(), self.url.as_deref(), self.domain.as_deref()]
            .into_iter()
            .flatten()
    }
}

/// Capability set the collector depends on. Concrete transports (REST, test
/// fakes) live behind this trait; the engine never sees a client library.
#[async_trait]
pub trait OrgClient: Send + Sync {
    async fn describe(&self, object: &str) -> Result<ObjectDescribe, ScanError>;
    async fn query(&self, soql: &str) -> Result<QueryResult, ScanError>;
    async fn tooling_query(&self, soql: &str) -> Result<QueryResult, ScanError>;
    async fn metadata_list(&self, type_spec: &str) -> Result<Vec<MetadataRecord>, ScanError>;
}
