use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::OrgConfig;
use crate::core::error::ScanError;
use crate::org::{MetadataRecord, ObjectDescribe, OrgClient, QueryResult};

/// Salesforce REST API client. Speaks `/services/data/vXX.X` with a bearer
/// token the caller already obtained.
pub struct RestClient {
    http: reqwest::Client,
    instance_url: String,
    api_version: String,
    access_token: String,
}

impl RestClient {
    pub fn new(cfg: &OrgConfig) -> Result<Self, ScanError> {
        let http = reqwest::Client::builder()
            .user_agent("orglens/0.2")
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(4))
            .build()
            .map_err(ScanError::from)?;
        Ok(Self {
            http,
            instance_url: cfg.instance_url.trim_end_matches('/').to_string(),
            api_version: cfg.api_version.clone(),
            access_token: cfg.access_token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/services/data/v{}/{}",
            self.instance_url, self.api_version, path
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, ScanError> {
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(ScanError::from)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScanError::Org(api_error_message(status.as_u16(), &body)));
        }
        resp.json::<T>().await.map_err(ScanError::from)
    }

    async fn run_query(&self, path: &str, soql: &str) -> Result<QueryResult, ScanError> {
        let url = format!(
            "{}?q={}",
            self.endpoint(path),
            urlencode(soql)
        );
        self.get_json(url).await
    }
}

#[async_trait]
impl OrgClient for RestClient {
    async fn describe(&self, object: &str) -> Result<ObjectDescribe, ScanError> {
        let url = self.endpoint(&format!("sobjects/{}/describe", object));
        self.get_json(url).await
    }

    async fn query(&self, soql: &str) -> Result<QueryResult, ScanError> {
        self.run_query("query", soql).await
    }

    async fn tooling_query(&self, soql: &str) -> Result<QueryResult, ScanError> {
        self.run_query("tooling/query", soql).await
    }

    async fn metadata_list(&self, type_spec: &str) -> Result<Vec<MetadataRecord>, ScanError> {
        // Listings come from whichever API exposes the type queryably; the
        // trait flattens that difference for the collector.
        let result = match type_spec {
            "ConnectedApp" => {
                self.query("SELECT Name FROM ConnectedApplication").await?
            }
            "Domain" => {
                self.query("SELECT Id, Domain FROM Domain").await?
            }
            "Network" => {
                self.query("SELECT Id, Name, Status FROM Network").await?
            }
            "RemoteSiteSetting" => {
                self.tooling_query("SELECT SiteName, EndpointUrl FROM RemoteProxy")
                    .await?
            }
            "CustomObject" => {
                self.tooling_query(
                    "SELECT DeveloperName FROM CustomObject ORDER BY DeveloperName",
                )
                .await?
            }
            other => {
                self.query(&format!("SELECT Id, Name FROM {}", sanitize_sobject(other)?))
                    .await?
            }
        };
        let mut out = Vec::with_capacity(result.records.len());
        for record in result.records {
            let parsed: MetadataRecord =
                serde_json::from_value(flatten_names(record)).unwrap_or_default();
            out.push(parsed);
        }
        Ok(out)
    }
}

/// DeveloperName listings come back without a plain `Name`; normalize so
/// `MetadataRecord` sees one candidate field shape.
fn flatten_names(mut record: serde_json::Value) -> serde_json::Value {
    if let Some(obj) = record.as_object_mut() {
        if !obj.contains_key("Name") {
            if let Some(dev) = obj.get("DeveloperName").cloned() {
                obj.insert("Name".to_string(), dev);
            } else if let Some(site) = obj.get("SiteName").cloned() {
                obj.insert("Name".to_string(), site);
            }
        }
        if !obj.contains_key("Url") {
            if let Some(endpoint) = obj.get("EndpointUrl").cloned() {
                obj.insert("Url".to_string(), endpoint);
            }
        }
    }
    record
}

fn sanitize_sobject(name: &str) -> Result<&str, ScanError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(ScanError::Org(format!("invalid sobject name: {}", name)))
    }
}

fn api_error_message(status: u16, body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiError {
        #[serde(default)]
        message: String,
        #[serde(rename = "errorCode", default)]
        error_code: String,
    }
    if let Ok(errors) = serde_json::from_str::<Vec<ApiError>>(body) {
        if let Some(first) = errors.first() {
            return format!("{}: {}", first.error_code, first.message);
        }
    }
    format!("HTTP {}", status)
}

fn urlencode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}
