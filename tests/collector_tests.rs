mod common;

use std::time::Duration;

use common::{records_result, ScriptedOrg};
use orglens::config::definitions::{DetectionMethod, IndicatorItem, IndicatorKind};
use orglens::core::evidence::{EvidenceDetails, EvidenceType};
use orglens::core::time::Timeframe;
use orglens::pipeline::collector::{EvidenceCollector, ObjectCheck, UsageProbe};

const TIMEOUT: Duration = Duration::from_secs(2);

fn item(kind: IndicatorKind, name: &str) -> IndicatorItem {
    serde_json::from_value(serde_json::json!({
        "type": match kind {
            IndicatorKind::Object => "object",
            IndicatorKind::Feature => "feature",
            IndicatorKind::Activity => "activity",
            IndicatorKind::Api => "api",
            IndicatorKind::Integration => "integration",
            IndicatorKind::Code => "code",
            IndicatorKind::Unknown => "unknown",
        },
        "name": name,
    }))
    .unwrap()
}

#[tokio::test]
async fn object_probe_merges_usage_at_construction() {
    let org = ScriptedOrg::new()
        .with_describe("Case", &["Status", "Origin", "Priority"])
        .with_count("SELECT COUNT() FROM Case", 1200)
        .with_count("SELECT COUNT() FROM Case WHERE CreatedDate = LAST_N_DAYS:30", 15);
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let required = vec!["Status".to_string(), "Origin".to_string()];
    let evidence = collector
        .check_object(
            "Case",
            1.0,
            ObjectCheck {
                required_fields: &required,
                check_record_count: true,
                check_last_modified: false,
                usage: Some(UsageProbe {
                    timeframe: Timeframe::parse("last30Days").unwrap(),
                    threshold: Some(10),
                    additional_where: None,
                }),
            },
        )
        .await;

    assert!(evidence.detected);
    assert_eq!(evidence.evidence_type, EvidenceType::ObjectPresence);
    match &evidence.details {
        EvidenceDetails::Object(obj) => {
            assert_eq!(obj.all_required_fields, Some(true));
            assert_eq!(obj.record_count, Some(1200));
            let usage = obj.usage.as_ref().expect("usage merged");
            assert_eq!(usage.count, Some(15));
            assert_eq!(usage.threshold, Some(10));
        }
        other => panic!("expected object details, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_object_is_never_usage_probed() {
    let org = ScriptedOrg::new();
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let evidence = collector
        .check_object(
            "WorkOrder",
            1.0,
            ObjectCheck {
                required_fields: &[],
                check_record_count: true,
                check_last_modified: true,
                usage: Some(UsageProbe {
                    timeframe: Timeframe::default(),
                    threshold: Some(10),
                    additional_where: None,
                }),
            },
        )
        .await;

    assert!(!evidence.detected);
    match &evidence.details {
        EvidenceDetails::Failure(f) => assert!(f.error.as_deref().unwrap().contains("NOT_FOUND")),
        other => panic!("expected failure details, got {:?}", other),
    }
    // the failed describe short-circuits everything else
    assert_eq!(org.call_log(), vec!["describe:WorkOrder"]);
}

#[tokio::test]
async fn slow_probe_degrades_to_timeout_evidence() {
    // the org would answer, but not inside the probe budget
    let org = ScriptedOrg::new()
        .with_describe("Case", &["Status"])
        .with_latency(Duration::from_millis(200));
    let collector = EvidenceCollector::new(&org, Duration::from_millis(10));

    let evidence = collector
        .check_object("Case", 1.0, ObjectCheck::default())
        .await;

    assert!(!evidence.detected);
    assert_eq!(evidence.evidence_type, EvidenceType::ObjectPresence);
    match &evidence.details {
        EvidenceDetails::Failure(f) => assert_eq!(f.error.as_deref(), Some("timeout")),
        other => panic!("expected failure details, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_required_fields_do_not_affect_detection() {
    let org = ScriptedOrg::new().with_describe("Case", &["Status"]);
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let required = vec!["Status".to_string(), "Priority".to_string()];
    let evidence = collector
        .check_object("Case", 1.0, ObjectCheck { required_fields: &required, ..Default::default() })
        .await;

    assert!(evidence.detected);
    match &evidence.details {
        EvidenceDetails::Object(obj) => {
            assert_eq!(obj.all_required_fields, Some(false));
            assert_eq!(obj.missing_fields, vec!["Priority".to_string()]);
        }
        other => panic!("expected object details, got {:?}", other),
    }
}

#[tokio::test]
async fn usage_probe_detects_only_positive_counts() {
    let org = ScriptedOrg::new()
        .with_count("SELECT COUNT() FROM Case WHERE CreatedDate = LAST_N_DAYS:30", 15)
        .with_count(
            "SELECT COUNT() FROM Lead WHERE CreatedDate = LAST_N_DAYS:30 AND IsConverted = false",
            0,
        );
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let active = collector
        .check_object_usage(
            "Case",
            1.0,
            UsageProbe {
                timeframe: Timeframe::default(),
                threshold: Some(10),
                additional_where: None,
            },
        )
        .await;
    assert!(active.detected);
    assert_eq!(active.evidence_type, EvidenceType::ObjectUsage);
    assert_eq!(active.usage_stats().and_then(|u| u.count), Some(15));

    let idle = collector
        .check_object_usage(
            "Lead",
            1.0,
            UsageProbe {
                timeframe: Timeframe::default(),
                threshold: Some(10),
                additional_where: Some("IsConverted = false"),
            },
        )
        .await;
    assert!(!idle.detected);
    match &idle.details {
        EvidenceDetails::Failure(f) => {
            assert_eq!(f.message.as_deref(), Some("no Lead records in last 30 days"));
        }
        other => panic!("expected failure details, got {:?}", other),
    }
}

#[tokio::test]
async fn feature_detection_is_first_match_wins() {
    // first method misses, second hits; only the second's details survive
    let org = ScriptedOrg::new()
        .with_describe("ServiceChannel", &["Id"])
        .with_count("SELECT COUNT() FROM ServiceChannel", 2);
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let methods = vec![
        DetectionMethod::Object {
            object: "PresenceUserConfig".to_string(),
            min_count: Some(1),
            required_fields: vec![],
        },
        DetectionMethod::Object {
            object: "ServiceChannel".to_string(),
            min_count: Some(1),
            required_fields: vec![],
        },
    ];
    let evidence = collector.check_feature("Omni-Channel", 1.0, &methods).await;

    assert!(evidence.detected);
    match &evidence.details {
        EvidenceDetails::Feature(f) => {
            assert_eq!(f.method.as_deref(), Some("object"));
            assert_eq!(f.matched, vec!["ServiceChannel".to_string()]);
        }
        other => panic!("expected feature details, got {:?}", other),
    }
}

#[tokio::test]
async fn feature_methods_run_in_declaration_order() {
    let org = ScriptedOrg::new()
        .with_metadata("EmailServicesAddress", &["case-intake"])
        .with_describe("ServiceChannel", &["Id"]);
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let methods = vec![
        DetectionMethod::Metadata {
            path: "EmailServicesAddress".to_string(),
            pattern: None,
            min_count: Some(1),
        },
        DetectionMethod::Object {
            object: "ServiceChannel".to_string(),
            min_count: None,
            required_fields: vec![],
        },
    ];
    let evidence = collector.check_feature("Email-to-Case", 1.0, &methods).await;

    assert!(evidence.detected);
    // the second method was never tried
    assert_eq!(org.call_log(), vec!["metadata:EmailServicesAddress"]);
    match &evidence.details {
        EvidenceDetails::Feature(f) => assert_eq!(f.method.as_deref(), Some("metadata")),
        other => panic!("expected feature details, got {:?}", other),
    }
}

#[tokio::test]
async fn feature_without_any_match_carries_reason() {
    let org = ScriptedOrg::new();
    let collector = EvidenceCollector::new(&org, TIMEOUT);
    let evidence = collector.check_feature("Knowledge", 1.0, &[]).await;
    assert!(!evidence.detected);
    match &evidence.details {
        EvidenceDetails::Failure(f) => {
            assert_eq!(f.message.as_deref(), Some("no detection method matched"));
        }
        other => panic!("expected failure details, got {:?}", other),
    }
}

#[tokio::test]
async fn metadata_pattern_filters_candidates() {
    let org = ScriptedOrg::new().with_metadata(
        "ConnectedApp",
        &["Einstein Activity Capture", "Data Loader", "Einstein Bots"],
    );
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let methods = vec![DetectionMethod::Metadata {
        path: "ConnectedApp".to_string(),
        pattern: Some("Einstein".to_string()),
        min_count: Some(2),
    }];
    let evidence = collector.check_feature("Einstein", 1.0, &methods).await;

    assert!(evidence.detected);
    match &evidence.details {
        EvidenceDetails::Feature(f) => {
            assert_eq!(
                f.matched,
                vec![
                    "Einstein Activity Capture".to_string(),
                    "Einstein Bots".to_string()
                ]
            );
        }
        other => panic!("expected feature details, got {:?}", other),
    }
}

#[tokio::test]
async fn custom_domain_ignores_stock_suffixes() {
    let org = ScriptedOrg::new().with_query(
        "SELECT Id, Domain FROM Domain",
        records_result(vec![
            serde_json::json!({"Id": "0", "Domain": "acme.my.salesforce.com"}),
            serde_json::json!({"Id": "1", "Domain": "portal.acme.com"}),
        ]),
    );
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let methods = vec![DetectionMethod::Field {
        object: "Domain".to_string(),
        name: "Domain".to_string(),
        pattern: None,
        value: None,
    }];
    let evidence = collector.check_feature("Custom Domain", 1.0, &methods).await;

    assert!(evidence.detected);
    match &evidence.details {
        EvidenceDetails::Feature(f) => {
            assert_eq!(f.matched, vec!["portal.acme.com".to_string()]);
        }
        other => panic!("expected feature details, got {:?}", other),
    }
}

#[tokio::test]
async fn field_method_with_value_requires_matching_record() {
    let org = ScriptedOrg::new()
        .with_describe("Network", &["Id", "Name", "Status"])
        .with_count("SELECT COUNT() FROM Network WHERE Status = 'Live'", 0);
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let methods = vec![DetectionMethod::Field {
        object: "Network".to_string(),
        name: "Status".to_string(),
        pattern: None,
        value: Some(serde_json::json!("Live")),
    }];
    let evidence = collector.check_feature("Active Sites", 1.0, &methods).await;
    assert!(!evidence.detected);
}

#[tokio::test]
async fn activity_probe_queries_login_history() {
    let org = ScriptedOrg::new().with_count(
        "SELECT COUNT() FROM LoginHistory WHERE LoginTime = LAST_N_DAYS:30",
        340,
    );
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let mut probe = item(IndicatorKind::Activity, "Agent Logins");
    probe.activity_type = Some("loginHistory".to_string());
    probe.activity_threshold = Some(100);
    probe.timeframe = Some("last30Days".to_string());

    let evidence = collector.check_user_activity(&probe).await;
    assert!(evidence.detected);
    let usage = evidence.usage_stats().expect("usage stats");
    assert_eq!(usage.count, Some(340));
    assert_eq!(usage.threshold, Some(100));
}

#[tokio::test]
async fn event_log_activity_is_deterministic() {
    let org = ScriptedOrg::new();
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let mut probe = item(IndicatorKind::Activity, "Console Clicks");
    probe.activity_type = Some("eventLog".to_string());
    probe.activity_threshold = Some(50);

    let first = collector.check_user_activity(&probe).await;
    let second = collector.check_user_activity(&probe).await;
    assert_eq!(first.detected, second.detected);
    assert_eq!(
        first.usage_stats().and_then(|u| u.count),
        second.usage_stats().and_then(|u| u.count)
    );
    // fabricated counts never touch the org
    assert!(org.call_log().is_empty());
}

#[tokio::test]
async fn code_probe_collects_class_and_trigger_names() {
    let org = ScriptedOrg::new()
        .with_tooling(
            "SELECT Name FROM ApexClass WHERE Body LIKE '%Case%'",
            records_result(vec![
                serde_json::json!({"Name": "CaseRouter"}),
                serde_json::json!({"Name": "CaseHandler"}),
            ]),
        )
        .with_tooling(
            "SELECT Name FROM ApexTrigger WHERE TableEnumOrId = 'Case'",
            records_result(vec![serde_json::json!({"Name": "CaseTrigger"})]),
        );
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let mut probe = item(IndicatorKind::Code, "Case Automation");
    probe.trigger_object = Some("Case".to_string());
    probe.pattern = Some("Case".to_string());

    let evidence = collector.check_code_references(&probe).await;
    assert!(evidence.detected);
    assert_eq!(
        evidence.code_matches().unwrap(),
        &["CaseHandler", "CaseRouter", "CaseTrigger"]
    );
}

#[tokio::test]
async fn code_probe_rejects_unsupported_code_types() {
    let org = ScriptedOrg::new();
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let mut probe = item(IndicatorKind::Code, "Flow Automation");
    probe.code_type = Some("flow".to_string());

    let evidence = collector.check_code_references(&probe).await;
    assert!(!evidence.detected);
    assert!(org.call_log().is_empty());
}

#[tokio::test]
async fn api_usage_sums_integration_artifacts() {
    let org = ScriptedOrg::new()
        .with_count("SELECT COUNT() FROM ConnectedApplication", 4)
        .with_count("SELECT COUNT() FROM NamedCredential", 1)
        .with_count("SELECT COUNT() FROM AuthProvider", 0)
        .with_tooling("SELECT COUNT() FROM RemoteProxy", common::count_result(2));
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let mut probe = item(IndicatorKind::Api, "Integrations");
    probe.activity_threshold = Some(3);

    let evidence = collector.check_api_usage(&probe).await;
    assert!(evidence.detected);
    let usage = evidence.usage_stats().expect("usage stats");
    assert_eq!(usage.count, Some(7));
    assert_eq!(usage.threshold, Some(3));
}

#[tokio::test]
async fn probes_are_pure_given_fixed_org_state() {
    let org = ScriptedOrg::new()
        .with_describe("Case", &["Status"])
        .with_count("SELECT COUNT() FROM Case", 10);
    let collector = EvidenceCollector::new(&org, TIMEOUT);

    let opts = || ObjectCheck {
        required_fields: &[],
        check_record_count: true,
        check_last_modified: false,
        usage: None,
    };
    let first = collector.check_object("Case", 1.0, opts()).await;
    let mut second = collector.check_object("Case", 1.0, opts()).await;
    // timestamps differ by wall clock; everything else must be identical
    second.timestamp = first.timestamp;
    assert_eq!(first, second);
}
