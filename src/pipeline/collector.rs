use std::future::Future;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::definitions::{DetectionMethod, IndicatorItem};
use crate::core::error::ScanError;
use crate::core::evidence::{
    CodeDetails, Evidence, EvidenceDetails, EvidenceType, FeatureDetails, ObjectDetails,
    UsageStats,
};
use crate::core::hash::pseudo_count;
use crate::core::time::Timeframe;
use crate::org::OrgClient;

/// Domain suffixes every org gets by default; a domain record counts as a
/// custom domain only when it matches none of these.
const DEFAULT_DOMAIN_SUFFIXES: [&str; 5] = [
    ".my.salesforce.com",
    ".lightning.force.com",
    ".my.site.com",
    ".force.com",
    ".salesforce.com",
];

/// Options for a single object probe, assembled by the analyzer from an
/// indicator item or by `check_feature` from an object detection method.
#[derive(Debug, Default)]
pub struct ObjectCheck<'a> {
    pub required_fields: &'a [String],
    pub check_record_count: bool,
    pub check_last_modified: bool,
    pub usage: Option<UsageProbe<'a>>,
}

#[derive(Debug, Clone)]
pub struct UsageProbe<'a> {
    pub timeframe: Timeframe,
    pub threshold: Option<u64>,
    pub additional_where: Option<&'a str>,
}

/// Issues org queries per detection kind and turns the raw results into
/// evidence. Every probe returns an `Evidence`; query failures and timeouts
/// degrade to `detected=false` with the reason in the details, so the
/// analyzer can proceed through partial org access.
pub struct EvidenceCollector<'a> {
    client: &'a dyn OrgClient,
    probe_timeout: Duration,
}

impl<'a> EvidenceCollector<'a> {
    pub fn new(client: &'a dyn OrgClient, probe_timeout: Duration) -> Self {
        Self {
            client,
            probe_timeout,
        }
    }

    async fn guarded<T, F>(&self, fut: F) -> Result<T, ScanError>
    where
        F: Future<Output = Result<T, ScanError>>,
    {
        match tokio::time::timeout(self.probe_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::Timeout),
        }
    }

    /// Describe the object; `detected` is describe success. Required-field
    /// gaps are recorded without affecting detection. When a usage probe is
    /// requested and the object exists, the usage sub-result is composed
    /// into the evidence before it is built; a missing object is never
    /// usage-probed.
    pub async fn check_object(
        &self,
        name: &str,
        weight: f64,
        opts: ObjectCheck<'_>,
    ) -> Evidence {
        let describe = match self.guarded(self.client.describe(name)).await {
            Ok(describe) => describe,
            Err(err) => {
                debug!("describe {} failed: {}", name, err);
                return Evidence::probe_error(
                    EvidenceType::ObjectPresence,
                    name,
                    weight,
                    err.to_string(),
                );
            }
        };

        let mut details = ObjectDetails::default();
        if !opts.required_fields.is_empty() {
            let missing: Vec<String> = opts
                .required_fields
                .iter()
                .filter(|f| !describe.has_field(f))
                .cloned()
                .collect();
            details.all_required_fields = Some(missing.is_empty());
            details.missing_fields = missing;
        }

        if opts.check_record_count {
            let soql = format!("SELECT COUNT() FROM {}", name);
            match self.guarded(self.client.query(&soql)).await {
                Ok(result) => details.record_count = Some(result.total_size),
                Err(err) => debug!("record count for {} failed: {}", name, err),
            }
        }

        if opts.check_last_modified {
            let soql = format!(
                "SELECT LastModifiedDate FROM {} ORDER BY LastModifiedDate DESC LIMIT 1",
                name
            );
            match self.guarded(self.client.query(&soql)).await {
                Ok(result) => {
                    details.last_modified = result
                        .record_str(0, "LastModifiedDate")
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&chrono::Utc));
                }
                Err(err) => debug!("last modified for {} failed: {}", name, err),
            }
        }

        if let Some(probe) = &opts.usage {
            match self.count_in_window(name, probe).await {
                Ok(count) => {
                    details.usage = Some(UsageStats {
                        count: Some(count),
                        threshold: probe.threshold,
                        timeframe_days: Some(probe.timeframe.days),
                    });
                }
                Err(err) => debug!("usage probe for {} failed: {}", name, err),
            }
        }

        Evidence::found(
            EvidenceType::ObjectPresence,
            name,
            weight,
            EvidenceDetails::Object(details),
        )
    }

    /// Count of records created inside the timeframe; `detected` means the
    /// count is positive.
    pub async fn check_object_usage(
        &self,
        name: &str,
        weight: f64,
        probe: UsageProbe<'_>,
    ) -> Evidence {
        match self.count_in_window(name, &probe).await {
            Ok(count) if count > 0 => Evidence::found(
                EvidenceType::ObjectUsage,
                name,
                weight,
                EvidenceDetails::Usage(UsageStats {
                    count: Some(count),
                    threshold: probe.threshold,
                    timeframe_days: Some(probe.timeframe.days),
                }),
            ),
            Ok(_) => Evidence::not_found(
                EvidenceType::ObjectUsage,
                name,
                weight,
                format!("no {} records in last {} days", name, probe.timeframe.days),
            ),
            Err(err) => {
                debug!("usage query for {} failed: {}", name, err);
                Evidence::probe_error(EvidenceType::ObjectUsage, name, weight, err.to_string())
            }
        }
    }

    async fn count_in_window(
        &self,
        object: &str,
        probe: &UsageProbe<'_>,
    ) -> Result<u64, ScanError> {
        let mut soql = format!(
            "SELECT COUNT() FROM {} WHERE CreatedDate = {}",
            object,
            probe.timeframe.soql_literal()
        );
        if let Some(extra) = probe.additional_where {
            soql.push_str(" AND ");
            soql.push_str(extra);
        }
        Ok(self.guarded(self.client.query(&soql)).await?.total_size)
    }

    /// Try each detection method in declaration order; the first one that
    /// matches wins and its details alone are kept. Method errors count as
    /// non-matches, not failures.
    pub async fn check_feature(
        &self,
        name: &str,
        weight: f64,
        methods: &[DetectionMethod],
    ) -> Evidence {
        let mut last_error: Option<String> = None;
        for method in methods {
            match self.try_detection_method(method).await {
                Ok(Some(matched)) => {
                    return Evidence::found(
                        EvidenceType::FeatureConfiguration,
                        name,
                        weight,
                        EvidenceDetails::Feature(FeatureDetails {
                            method: Some(method.label().to_string()),
                            matched,
                        }),
                    );
                }
                Ok(None) => {}
                Err(err) => {
                    debug!("feature {} via {} failed: {}", name, method.label(), err);
                    last_error = Some(err.to_string());
                }
            }
        }
        match last_error {
            Some(err) => Evidence::probe_error(EvidenceType::FeatureConfiguration, name, weight, err),
            None => Evidence::not_found(
                EvidenceType::FeatureConfiguration,
                name,
                weight,
                "no detection method matched",
            ),
        }
    }

    /// `Ok(Some(matched))` on a hit, `Ok(None)` on a clean miss.
    async fn try_detection_method(
        &self,
        method: &DetectionMethod,
    ) -> Result<Option<Vec<String>>, ScanError> {
        match method {
            DetectionMethod::Metadata {
                path,
                pattern,
                min_count,
            } => {
                let records = self.guarded(self.client.metadata_list(path)).await?;
                let matcher = compile_pattern(pattern.as_deref())?;
                let matched: Vec<String> = records
                    .iter()
                    .filter(|record| match &matcher {
                        Some(re) => record.candidate_fields().any(|v| re.is_match(v)),
                        None => true,
                    })
                    .filter_map(|record| record.name.clone())
                    .collect();
                let needed = min_count.unwrap_or(1) as usize;
                if matched.len() >= needed {
                    Ok(Some(matched))
                } else {
                    Ok(None)
                }
            }
            DetectionMethod::Field {
                object,
                name,
                pattern,
                value,
            } => {
                if object == "Domain" && name == "Domain" {
                    return self.check_custom_domain().await;
                }
                let describe = self.guarded(self.client.describe(object)).await?;
                let matcher = compile_pattern(pattern.as_deref())?;
                let field = describe.fields.iter().find(|f| {
                    f.name == *name
                        || matcher.as_ref().map(|re| re.is_match(&f.name)).unwrap_or(false)
                });
                let Some(field) = field else {
                    return Ok(None);
                };
                if let Some(expected) = value {
                    let soql = format!(
                        "SELECT COUNT() FROM {} WHERE {} = {}",
                        object,
                        field.name,
                        soql_value(expected)
                    );
                    let result = self.guarded(self.client.query(&soql)).await?;
                    if result.total_size == 0 {
                        return Ok(None);
                    }
                }
                Ok(Some(vec![format!("{}.{}", object, field.name)]))
            }
            DetectionMethod::Object {
                object,
                min_count,
                required_fields,
            } => {
                let describe = self.guarded(self.client.describe(object)).await;
                let Ok(describe) = describe else {
                    return Ok(None);
                };
                if required_fields.iter().any(|f| !describe.has_field(f)) {
                    return Ok(None);
                }
                if let Some(min) = min_count {
                    let soql = format!("SELECT COUNT() FROM {}", object);
                    let result = self.guarded(self.client.query(&soql)).await?;
                    if result.total_size < *min {
                        return Ok(None);
                    }
                }
                Ok(Some(vec![object.clone()]))
            }
        }
    }

    /// My Domain records that do not end in a stock Salesforce suffix.
    async fn check_custom_domain(&self) -> Result<Option<Vec<String>>, ScanError> {
        let result = self
            .guarded(self.client.query("SELECT Id, Domain FROM Domain"))
            .await?;
        let custom: Vec<String> = result
            .records
            .iter()
            .filter_map(|record| record.get("Domain").and_then(|v| v.as_str()))
            .filter(|domain| {
                !DEFAULT_DOMAIN_SUFFIXES
                    .iter()
                    .any(|suffix| domain.ends_with(suffix))
            })
            .map(|domain| domain.to_string())
            .collect();
        if custom.is_empty() {
            Ok(None)
        } else {
            Ok(Some(custom))
        }
    }

    /// Integration surface: connected apps, named credentials, remote sites
    /// and auth providers. The counts are summed; artifacts the org refuses
    /// to expose are skipped rather than failing the probe.
    pub async fn check_api_usage(&self, item: &IndicatorItem) -> Evidence {
        let probes: [(&str, &str, bool); 4] = [
            ("connected apps", "SELECT COUNT() FROM ConnectedApplication", false),
            ("named credentials", "SELECT COUNT() FROM NamedCredential", false),
            ("auth providers", "SELECT COUNT() FROM AuthProvider", false),
            ("remote sites", "SELECT COUNT() FROM RemoteProxy", true),
        ];

        let mut total = 0u64;
        let mut probed_any = false;
        let mut last_error: Option<String> = None;
        for (label, soql, tooling) in probes {
            let result = if tooling {
                self.guarded(self.client.tooling_query(soql)).await
            } else {
                self.guarded(self.client.query(soql)).await
            };
            match result {
                Ok(result) => {
                    probed_any = true;
                    total += result.total_size;
                }
                Err(err) => {
                    debug!("api usage probe ({}) failed: {}", label, err);
                    last_error = Some(err.to_string());
                }
            }
        }

        if !probed_any {
            return Evidence::probe_error(
                EvidenceType::ApiUsage,
                &item.name,
                item.weight,
                last_error.unwrap_or_else(|| "all integration probes failed".into()),
            );
        }
        if total == 0 {
            return Evidence::not_found(
                EvidenceType::ApiUsage,
                &item.name,
                item.weight,
                "no integration artifacts found",
            );
        }
        Evidence::found(
            EvidenceType::ApiUsage,
            &item.name,
            item.weight,
            EvidenceDetails::Usage(UsageStats {
                count: Some(total),
                threshold: item.activity_threshold,
                timeframe_days: None,
            }),
        )
    }

    /// User activity within the timeframe. Real kinds query the org; the
    /// legacy `eventLog` kind fabricates a deterministic count and is kept
    /// only so old definitions keep working offline.
    pub async fn check_user_activity(&self, item: &IndicatorItem) -> Evidence {
        let timeframe = parse_timeframe(item.timeframe.as_deref());
        let kind = item.activity_type.as_deref().unwrap_or("loginHistory");

        let soql = match kind {
            "loginHistory" => Some(format!(
                "SELECT COUNT() FROM LoginHistory WHERE LoginTime = {}",
                timeframe.soql_literal()
            )),
            "report" => Some(format!(
                "SELECT COUNT() FROM Report WHERE LastRunDate = {}",
                timeframe.soql_literal()
            )),
            "dashboard" => Some(format!(
                "SELECT COUNT() FROM Dashboard WHERE LastModifiedDate = {}",
                timeframe.soql_literal()
            )),
            "listView" => Some(format!(
                "SELECT COUNT() FROM ListView WHERE LastViewedDate = {}",
                timeframe.soql_literal()
            )),
            "eventLog" => None,
            other => {
                return Evidence::not_found(
                    EvidenceType::UserActivity,
                    &item.name,
                    item.weight,
                    format!("unsupported activity type: {}", other),
                );
            }
        };

        let count = match soql {
            Some(soql) => match self.guarded(self.client.query(&soql)).await {
                Ok(result) => result.total_size,
                Err(err) => {
                    debug!("activity query for {} failed: {}", item.name, err);
                    return Evidence::probe_error(
                        EvidenceType::UserActivity,
                        &item.name,
                        item.weight,
                        err.to_string(),
                    );
                }
            },
            None => {
                warn!(
                    "eventLog activity for {} uses the deprecated fabricated count",
                    item.name
                );
                let options = format!(
                    "{}|{}|{}",
                    item.event_type.as_deref().unwrap_or(""),
                    item.pattern.as_deref().unwrap_or(""),
                    timeframe.days
                );
                let max = item.activity_threshold.unwrap_or(50) * 3 + 1;
                pseudo_count(&item.name, &options, max)
            }
        };

        if count == 0 {
            return Evidence::not_found(
                EvidenceType::UserActivity,
                &item.name,
                item.weight,
                format!("no {} activity in last {} days", kind, timeframe.days),
            );
        }
        Evidence::found(
            EvidenceType::UserActivity,
            &item.name,
            item.weight,
            EvidenceDetails::Usage(UsageStats {
                count: Some(count),
                threshold: item.activity_threshold,
                timeframe_days: Some(timeframe.days),
            }),
        )
    }

    /// Apex references to a trigger object or literal pattern. Matches are
    /// class and trigger names; one match is enough to detect.
    pub async fn check_code_references(&self, item: &IndicatorItem) -> Evidence {
        if let Some(kind) = item.code_type.as_deref() {
            if kind != "apex" {
                return Evidence::not_found(
                    EvidenceType::CodeReferences,
                    &item.name,
                    item.weight,
                    format!("unsupported code type: {}", kind),
                );
            }
        }
        let needle = item
            .pattern
            .as_deref()
            .or(item.trigger_object.as_deref())
            .unwrap_or(&item.name);

        let mut matches: Vec<String> = Vec::new();
        let mut last_error: Option<String> = None;

        let class_soql = format!(
            "SELECT Name FROM ApexClass WHERE Body LIKE '%{}%'",
            soql_escape(needle)
        );
        match self.guarded(self.client.tooling_query(&class_soql)).await {
            Ok(result) => {
                matches.extend(
                    result
                        .records
                        .iter()
                        .filter_map(|r| r.get("Name").and_then(|v| v.as_str()))
                        .map(|s| s.to_string()),
                );
            }
            Err(err) => {
                debug!("apex class search for {} failed: {}", item.name, err);
                last_error = Some(err.to_string());
            }
        }

        if let Some(trigger_object) = &item.trigger_object {
            let trigger_soql = format!(
                "SELECT Name FROM ApexTrigger WHERE TableEnumOrId = '{}'",
                soql_escape(trigger_object)
            );
            match self.guarded(self.client.tooling_query(&trigger_soql)).await {
                Ok(result) => {
                    matches.extend(
                        result
                            .records
                            .iter()
                            .filter_map(|r| r.get("Name").and_then(|v| v.as_str()))
                            .map(|s| s.to_string()),
                    );
                }
                Err(err) => debug!("trigger search for {} failed: {}", item.name, err),
            }
        }

        if matches.is_empty() {
            return match last_error {
                Some(err) => Evidence::probe_error(
                    EvidenceType::CodeReferences,
                    &item.name,
                    item.weight,
                    err,
                ),
                None => Evidence::not_found(
                    EvidenceType::CodeReferences,
                    &item.name,
                    item.weight,
                    format!("no Apex references to '{}'", needle),
                ),
            };
        }
        matches.sort();
        matches.dedup();
        Evidence::found(
            EvidenceType::CodeReferences,
            &item.name,
            item.weight,
            EvidenceDetails::Code(CodeDetails {
                matches: Some(matches),
            }),
        )
    }
}

pub fn parse_timeframe(value: Option<&str>) -> Timeframe {
    match value {
        Some(raw) => Timeframe::parse(raw).unwrap_or_else(|err| {
            warn!("{}; falling back to last30Days", err);
            Timeframe::default()
        }),
        None => Timeframe::default(),
    }
}

fn compile_pattern(pattern: Option<&str>) -> Result<Option<Regex>, ScanError> {
    match pattern {
        Some(raw) => Regex::new(raw)
            .map(Some)
            .map_err(|e| ScanError::Config(format!("bad pattern '{}': {}", raw, e))),
        None => Ok(None),
    }
}

fn soql_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn soql_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => format!("'{}'", soql_escape(s)),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => format!("'{}'", soql_escape(&other.to_string())),
    }
}
