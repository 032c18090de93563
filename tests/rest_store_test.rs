use httpmock::prelude::*;
use realm_schema_sync::core::resilience::{RetryPolicy, StoreCallGuard};
use realm_schema_sync::utils::error::ErrorCategory;
use realm_schema_sync::{
    ReconcileError, ReconcileOutcome, ReconcilePolicy, ReconciliationDriver, RestConfigStore,
    StaticTokenProvider, Trigger,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "AQIC5wM2LY4Sfcz";
const ROOT_REPOS: &str = "/am/json/realms/root/realm-config/services/id-repositories";
const SALES_REPOS: &str = "/am/json/realms/root/realms/sales/realm-config/services/id-repositories";

fn driver_with_retry(server: &MockServer, retry: RetryPolicy) -> ReconciliationDriver<RestConfigStore> {
    ReconciliationDriver::new(
        Arc::new(RestConfigStore::new(&server.url("/am")).unwrap()),
        Arc::new(StaticTokenProvider::new(TOKEN)),
        ReconcilePolicy::default(),
    )
    .with_guard(StoreCallGuard::new(retry, Duration::from_secs(5)))
}

fn driver_for(server: &MockServer) -> ReconciliationDriver<RestConfigStore> {
    driver_with_retry(server, RetryPolicy::none())
}

fn quick_retries() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        ..RetryPolicy::default()
    }
}

async fn mock_realms(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/am/json/global-config/realms")
                .query_param("_queryFilter", "true")
                .header("iPlanetDirectoryPro", TOKEN);
            then.status(200).json_body(json!({
                "result": [
                    {"_id": "Lw", "name": "/", "parentPath": null, "active": true},
                    {"_id": "L3NhbGVz", "name": "sales", "parentPath": "/", "active": true}
                ],
                "resultCount": 2
            }));
        })
        .await;
}

#[tokio::test]
async fn test_full_pass_against_rest_api() {
    let server = MockServer::start_async().await;
    mock_realms(&server).await;

    server
        .mock_async(|when, then| {
            when.method(POST)
                .path(ROOT_REPOS)
                .query_param("_action", "nextdescendents");
            then.status(200).json_body(json!({
                "result": [
                    {"_id": "ldap1", "_type": {"_id": "LDAPv3ForOpenDS", "name": "OpenDJ", "collection": true}},
                    {"_id": "embedded", "_type": {"_id": "EmbeddedDJ", "name": "Embedded", "collection": true}}
                ]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path(SALES_REPOS)
                .query_param("_action", "nextdescendents");
            then.status(200).json_body(json!({ "result": [] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{}/LDAPv3ForOpenDS/ldap1", ROOT_REPOS));
            then.status(200).json_body(json!({
                "_id": "ldap1",
                "_rev": "1234",
                "userconfig": {
                    "sun-idrepo-ldapv3-config-user-objectclass": ["top", "person"],
                    "sun-idrepo-ldapv3-config-user-attributes": ["cn", "deviceAttributes"]
                }
            }));
        })
        .await;
    let put = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path(format!("{}/LDAPv3ForOpenDS/ldap1", ROOT_REPOS))
                .header("iPlanetDirectoryPro", TOKEN)
                .header("Accept-API-Version", "protocol=2.0,resource=1.0")
                .body_contains("deviceAttributeContainer")
                .body_contains("person");
            then.status(200).json_body(json!({}));
        })
        .await;

    let report = driver_for(&server).run_pass(Trigger::Startup).await.unwrap();

    put.assert_async().await;
    assert!(report.is_clean());
    assert_eq!(report.realms_processed, 2);
    assert_eq!(report.sub_configs_examined, 1);
    assert_eq!(report.outcomes[0].outcome, ReconcileOutcome::ObjectClassUpdated);
}

#[tokio::test]
async fn test_realm_listing_error_is_fatal() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/am/json/global-config/realms");
            then.status(401).body("{\"code\":401,\"reason\":\"Unauthorized\"}");
        })
        .await;

    let result = driver_for(&server).run_pass(Trigger::Startup).await;

    match result {
        Err(ReconcileError::RealmEnumeration { source }) => {
            assert!(source.to_string().contains("401"));
        }
        other => panic!("expected enumeration failure, got {:?}", other.map(|r| r.errors)),
    }
}

#[tokio::test]
async fn test_rejected_put_is_recorded_as_write_error() {
    let server = MockServer::start_async().await;
    mock_realms(&server).await;

    server
        .mock_async(|when, then| {
            when.method(POST).path(ROOT_REPOS);
            then.status(200).json_body(json!({
                "result": [{"_id": "ldap1", "_type": {"_id": "LDAPv3ForAD"}}]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(SALES_REPOS);
            then.status(500).body("internal error");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("{}/LDAPv3ForAD/ldap1", ROOT_REPOS));
            then.status(200).json_body(json!({
                "sun-idrepo-ldapv3-config-user-objectclass": ["top"],
                "sun-idrepo-ldapv3-config-user-attributes": []
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path(format!("{}/LDAPv3ForAD/ldap1", ROOT_REPOS));
            then.status(403).body("forbidden");
        })
        .await;

    let report = driver_for(&server).run_pass(Trigger::Startup).await.unwrap();

    assert_eq!(report.errors.len(), 2);
    let root_error = report
        .errors
        .iter()
        .find(|e| e.sub_config.as_deref() == Some("ldap1"))
        .unwrap();
    assert_eq!(root_error.category, ErrorCategory::Write);
    assert!(root_error.message.contains("403"));

    let sales_error = report
        .errors
        .iter()
        .find(|e| e.realm.as_str() == "/sales")
        .unwrap();
    assert_eq!(sales_error.category, ErrorCategory::Access);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start_async().await;
    let listing = server
        .mock_async(|when, then| {
            when.method(GET).path("/am/json/global-config/realms");
            then.status(401).body("{\"code\":401,\"reason\":\"Unauthorized\"}");
        })
        .await;

    let result = driver_with_retry(&server, quick_retries())
        .run_pass(Trigger::Startup)
        .await;

    listing.assert_hits_async(1).await;
    match result {
        Err(ReconcileError::RealmEnumeration { source }) => {
            assert!(matches!(*source, ReconcileError::ConfigRejected { status: 401, .. }));
        }
        other => panic!("expected enumeration failure, got {:?}", other.map(|r| r.errors)),
    }
}

#[tokio::test]
async fn test_server_errors_are_retried_then_recorded() {
    let server = MockServer::start_async().await;
    mock_realms(&server).await;

    server
        .mock_async(|when, then| {
            when.method(POST).path(ROOT_REPOS);
            then.status(200).json_body(json!({ "result": [] }));
        })
        .await;
    let sales = server
        .mock_async(|when, then| {
            when.method(POST).path(SALES_REPOS);
            then.status(503).body("unavailable");
        })
        .await;

    let report = driver_with_retry(&server, quick_retries())
        .run_pass(Trigger::Startup)
        .await
        .unwrap();

    sales.assert_hits_async(3).await;
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].realm.as_str(), "/sales");
    assert_eq!(report.errors[0].sub_config, None);
    assert_eq!(report.errors[0].category, ErrorCategory::Access);
}

#[tokio::test]
async fn test_connectors_resolved_from_a_single_listing() {
    let server = MockServer::start_async().await;
    mock_realms(&server).await;

    let root_listing = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(ROOT_REPOS)
                .query_param("_action", "nextdescendents");
            then.status(200).json_body(json!({
                "result": [
                    {"_id": "ldap-a", "_type": {"_id": "LDAPv3ForOpenDS"}},
                    {"_id": "ldap-b", "_type": {"_id": "LDAPv3ForAD"}}
                ]
            }));
        })
        .await;
    let sales_listing = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(SALES_REPOS)
                .query_param("_action", "nextdescendents");
            then.status(200).json_body(json!({ "result": [] }));
        })
        .await;
    for (type_id, name) in [("LDAPv3ForOpenDS", "ldap-a"), ("LDAPv3ForAD", "ldap-b")] {
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{}/{}/{}", ROOT_REPOS, type_id, name));
                then.status(200).json_body(json!({
                    "sun-idrepo-ldapv3-config-user-objectclass": ["top", "deviceAttributeContainer"],
                    "sun-idrepo-ldapv3-config-user-attributes": ["deviceAttributes"]
                }));
            })
            .await;
    }

    let report = driver_for(&server).run_pass(Trigger::Startup).await.unwrap();

    root_listing.assert_hits_async(1).await;
    sales_listing.assert_hits_async(1).await;
    assert!(report.is_clean());
    assert_eq!(report.sub_configs_examined, 2);
    assert_eq!(report.sub_configs_updated, 0);
}
