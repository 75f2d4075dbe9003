#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use orglens::core::error::ScanError;
use orglens::org::{FieldDescribe, MetadataRecord, ObjectDescribe, OrgClient, QueryResult};

/// In-memory org scripted with exact describe/query responses. Anything not
/// scripted fails like a real org rejecting the request, and every call is
/// recorded so tests can assert which probes actually ran.
#[derive(Default)]
pub struct ScriptedOrg {
    describes: HashMap<String, ObjectDescribe>,
    queries: HashMap<String, QueryResult>,
    tooling: HashMap<String, QueryResult>,
    metadata: HashMap<String, Vec<MetadataRecord>>,
    latency: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedOrg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_describe(mut self, name: &str, fields: &[&str]) -> Self {
        self.describes.insert(
            name.to_string(),
            ObjectDescribe {
                name: name.to_string(),
                custom: name.ends_with("__c"),
                fields: fields
                    .iter()
                    .map(|f| FieldDescribe {
                        name: f.to_string(),
                        field_type: "string".to_string(),
                    })
                    .collect(),
            },
        );
        self
    }

    pub fn with_query(mut self, soql: &str, result: QueryResult) -> Self {
        self.queries.insert(soql.to_string(), result);
        self
    }

    pub fn with_count(self, soql: &str, count: u64) -> Self {
        self.with_query(soql, count_result(count))
    }

    pub fn with_tooling(mut self, soql: &str, result: QueryResult) -> Self {
        self.tooling.insert(soql.to_string(), result);
        self
    }

    pub fn with_metadata(mut self, type_spec: &str, names: &[&str]) -> Self {
        self.metadata.insert(
            type_spec.to_string(),
            names
                .iter()
                .map(|n| MetadataRecord {
                    name: Some(n.to_string()),
                    url: None,
                    domain: None,
                })
                .collect(),
        );
        self
    }

    /// Delay every response; lets tests drive the collector's per-probe
    /// timeout.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn respond(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl OrgClient for ScriptedOrg {
    async fn describe(&self, object: &str) -> Result<ObjectDescribe, ScanError> {
        self.record(format!("describe:{}", object));
        self.respond().await;
        self.describes.get(object).cloned().ok_or_else(|| {
            ScanError::Org(format!(
                "NOT_FOUND: The requested resource does not exist: {}",
                object
            ))
        })
    }

    async fn query(&self, soql: &str) -> Result<QueryResult, ScanError> {
        self.record(format!("query:{}", soql));
        self.respond().await;
        self.queries
            .get(soql)
            .cloned()
            .ok_or_else(|| ScanError::Org(format!("INVALID_TYPE: {}", soql)))
    }

    async fn tooling_query(&self, soql: &str) -> Result<QueryResult, ScanError> {
        self.record(format!("tooling:{}", soql));
        self.respond().await;
        self.tooling
            .get(soql)
            .cloned()
            .ok_or_else(|| ScanError::Org(format!("INVALID_TYPE: {}", soql)))
    }

    async fn metadata_list(&self, type_spec: &str) -> Result<Vec<MetadataRecord>, ScanError> {
        self.record(format!("metadata:{}", type_spec));
        self.respond().await;
        self.metadata.get(type_spec).cloned().ok_or_else(|| {
            ScanError::Org(format!("INVALID_TYPE: metadata type {}", type_spec))
        })
    }
}

pub fn count_result(count: u64) -> QueryResult {
    QueryResult {
        total_size: count,
        records: vec![],
    }
}

pub fn records_result(records: Vec<serde_json::Value>) -> QueryResult {
    QueryResult {
        total_size: records.len() as u64,
        records,
    }
}
