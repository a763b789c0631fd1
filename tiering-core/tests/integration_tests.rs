//! Integration tests for the storage tiering engine
//!
//! These tests drive complete sweeps, restages and access-time updates
//! against the in-memory catalog and job queue.

use std::collections::BTreeSet;
use std::sync::Arc;

use tiering_core::{
    AttributeNames, CatalogFixture, HostContext, InMemoryCatalog, InMemoryJobQueue, QueryKind,
    RestageOutcome, RestageRequest, StorageTiering, SweepState, TieringConfig, TieringError,
};

const NOW: i64 = 1_700_000_000;

type Engine = StorageTiering<InMemoryCatalog, InMemoryJobQueue>;

struct Harness {
    catalog: Arc<InMemoryCatalog>,
    queue: Arc<InMemoryJobQueue>,
    engine: Engine,
}

fn attrs() -> AttributeNames {
    AttributeNames::default()
}

/// Create an engine over a fixture with the default configuration
fn harness(fixture: CatalogFixture) -> Harness {
    let catalog = Arc::new(InMemoryCatalog::from_fixture(fixture));
    let queue = Arc::new(InMemoryJobQueue::new());
    let engine = StorageTiering::new(
        HostContext::new(catalog.clone(), queue.clone()),
        TieringConfig::default(),
    )
    .unwrap();
    Harness {
        catalog,
        queue,
        engine,
    }
}

/// Two-tier group "tiers": fast (60s retention) -> slow
fn tiers_fixture() -> CatalogFixture {
    CatalogFixture::new()
        .with_tier("fast", "tiers", 0)
        .with_tier("slow", "tiers", 1)
        .with_resource_metadata("fast", &attrs().time, "60", "")
}

// ============ Sweep Scenario Tests ============

#[tokio::test]
async fn test_single_stale_object_yields_one_job() {
    let fixture = tiers_fixture()
        .with_replica("/z/o1", "fast")
        .with_access_time("/z/o1", NOW - 120);
    let h = harness(fixture);

    let report = h.engine.run_policy_for_group_at("tiers", NOW).await.unwrap();
    assert_eq!(report.state, SweepState::Done);

    let submissions = h.queue.submissions().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].queue, "storage-tiering");
    assert_eq!(submissions[0].job.object_path, "/z/o1");
    assert_eq!(submissions[0].job.source_resource, "fast");
    assert_eq!(submissions[0].job.destination_resource, "slow");
    assert!((1..=30).contains(&submissions[0].delay_secs));
}

#[tokio::test]
async fn test_object_limit_takes_most_overdue() {
    let mut fixture = tiers_fixture().with_resource_metadata("fast", &attrs().object_limit, "2", "");
    for (i, age) in [500, 9_000, 300, 7_000, 1_000].iter().enumerate() {
        let path = format!("/z/o{}", i);
        fixture = fixture
            .with_replica(&path, "fast")
            .with_access_time(&path, NOW - age);
    }
    let h = harness(fixture);

    let report = h.engine.run_policy_for_group_at("tiers", NOW).await.unwrap();
    assert_eq!(report.violations_found, 2);

    let paths: Vec<String> = h
        .queue
        .submissions()
        .await
        .into_iter()
        .map(|s| s.job.object_path)
        .collect();
    assert_eq!(paths, vec!["/z/o1", "/z/o3"]);
}

/// Coordinating member "repl" {d1, d2} with a shared limit of 2
fn shared_limit_fixture() -> CatalogFixture {
    let mut fixture = CatalogFixture::new()
        .with_child("repl", "d1")
        .with_child("repl", "d2")
        .with_tier("repl", "g", 0)
        .with_tier("cold", "g", 1)
        .with_resource_metadata("repl", &attrs().time, "60", "")
        .with_resource_metadata("repl", &attrs().object_limit, "2", "");
    for (path, leaf, age) in [
        ("/z/o0", "d1", 1_000),
        ("/z/o1", "d1", 2_000),
        ("/z/o2", "d1", 3_000),
        ("/z/o3", "d2", 90_000),
        ("/z/o4", "d2", 80_000),
    ] {
        fixture = fixture
            .with_replica(path, leaf)
            .with_access_time(path, NOW - age);
    }
    fixture
}

#[tokio::test]
async fn test_object_limit_is_shared_by_member_leaves() {
    let h = harness(shared_limit_fixture());

    let violations = h.engine.find_violations_at("repl", NOW).await.unwrap();
    let paths: Vec<&str> = violations.iter().map(|v| v.object_path.as_str()).collect();
    assert_eq!(paths, vec!["/z/o3", "/z/o4"]);
    assert!(violations.iter().all(|v| v.resource == "d2"));

    let report = h.engine.run_policy_for_group_at("g", NOW).await.unwrap();
    assert_eq!(report.violations_found, 2);

    let submissions = h.queue.submissions().await;
    assert_eq!(submissions.len(), 2);
    let jobs: Vec<(&str, &str)> = submissions
        .iter()
        .map(|s| (s.job.object_path.as_str(), s.job.source_resource.as_str()))
        .collect();
    assert_eq!(jobs, vec![("/z/o3", "d2"), ("/z/o4", "d2")]);
}

#[tokio::test]
async fn test_leaf_violations_capped_by_member_limit() {
    let h = harness(shared_limit_fixture());

    let violations = h.engine.find_violations_at("d1", NOW).await.unwrap();
    let paths: Vec<&str> = violations.iter().map(|v| v.object_path.as_str()).collect();
    assert_eq!(paths, vec!["/z/o2", "/z/o1"]);
}

#[tokio::test]
async fn test_malformed_retention_skips_only_that_resource() {
    let fixture = CatalogFixture::new()
        .with_tier("bad", "tiers", 0)
        .with_tier("good", "tiers", 0)
        .with_tier("slow", "tiers", 1)
        .with_resource_metadata("bad", &attrs().time, "abc", "")
        .with_resource_metadata("good", &attrs().time, "60", "")
        .with_replica("/z/on_bad", "bad")
        .with_access_time("/z/on_bad", 0)
        .with_replica("/z/on_good", "good")
        .with_access_time("/z/on_good", 0);
    let h = harness(fixture);

    let report = h.engine.run_policy_for_group_at("tiers", NOW).await.unwrap();
    assert_eq!(report.state, SweepState::Done);
    assert_eq!(report.resources_evaluated, 2);
    assert_eq!(report.policy_errors.len(), 1);
    assert_eq!(report.policy_errors[0].resource, "bad");
    assert!(report.policy_errors[0].error.contains("abc"));

    let submissions = h.queue.submissions().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].job.object_path, "/z/on_good");
}

#[tokio::test]
async fn test_never_retention_has_no_time_based_violations() {
    let fixture = CatalogFixture::new()
        .with_tier("fast", "tiers", 0)
        .with_tier("slow", "tiers", 1)
        .with_resource_metadata("fast", &attrs().time, "never", "")
        .with_replica("/z/ancient", "fast")
        .with_access_time("/z/ancient", 0);
    let h = harness(fixture);

    assert!(h
        .engine
        .find_violations_at("fast", NOW)
        .await
        .unwrap()
        .is_empty());
    let report = h.engine.run_policy_for_group_at("tiers", NOW).await.unwrap();
    assert_eq!(report.job_count(), 0);
}

#[tokio::test]
async fn test_every_violator_moves_to_next_tier_leaves() {
    let mut fixture = CatalogFixture::new()
        .with_tier("a", "g", 0)
        .with_child("b", "b_disk1")
        .with_child("b", "b_disk2")
        .with_tier("b", "g", 1)
        .with_resource_metadata("a", &attrs().time, "3600", "");
    for i in 0..7 {
        let path = format!("/z/obj{}", i);
        fixture = fixture
            .with_replica(&path, "a")
            .with_access_time(&path, NOW - 86_400 - i);
    }
    let h = harness(fixture);

    h.engine.run_policy_for_group_at("g", NOW).await.unwrap();

    let destinations: BTreeSet<&str> = ["b_disk1", "b_disk2"].into_iter().collect();
    let submissions = h.queue.submissions().await;
    assert_eq!(submissions.len(), 7);
    let objects: BTreeSet<&str> = submissions.iter().map(|s| s.job.object_path.as_str()).collect();
    assert_eq!(objects.len(), 7);
    for submission in &submissions {
        assert_eq!(submission.job.source_resource, "a");
        assert!(destinations.contains(submission.job.destination_resource.as_str()));
    }
}

#[tokio::test]
async fn test_three_tier_cascade() {
    let fixture = CatalogFixture::new()
        .with_tier("hot", "g", 0)
        .with_tier("warm", "g", 1)
        .with_tier("cold", "g", 2)
        .with_resource_metadata("hot", &attrs().time, "60", "")
        .with_resource_metadata("warm", &attrs().time, "3600", "")
        .with_resource_metadata("warm", &attrs().preserve_replicas, "true", "")
        .with_resource_metadata("cold", &attrs().time, "1", "")
        .with_replica("/z/h", "hot")
        .with_access_time("/z/h", NOW - 600)
        .with_replica("/z/w", "warm")
        .with_access_time("/z/w", NOW - 7_200)
        .with_replica("/z/c", "cold")
        .with_access_time("/z/c", 0);
    let h = harness(fixture);

    let report = h.engine.run_policy_for_group_at("g", NOW).await.unwrap();
    assert_eq!(report.tiers, 3);

    let jobs: Vec<(String, String, String, bool)> = h
        .queue
        .submissions()
        .await
        .into_iter()
        .map(|s| {
            (
                s.job.object_path,
                s.job.source_resource,
                s.job.destination_resource,
                s.job.preserve_replicas,
            )
        })
        .collect();
    assert_eq!(
        jobs,
        vec![
            ("/z/h".to_string(), "hot".to_string(), "warm".to_string(), false),
            ("/z/w".to_string(), "warm".to_string(), "cold".to_string(), true),
        ]
    );
}

#[tokio::test]
async fn test_unavailable_catalog_dispatches_nothing() {
    let fixture = tiers_fixture()
        .with_replica("/z/o1", "fast")
        .with_access_time("/z/o1", 0);
    let h = harness(fixture);
    h.catalog.set_unavailable(true);

    let err = h.engine.run_policy_for_group_at("tiers", NOW).await.unwrap_err();
    assert!(matches!(err, TieringError::Catalog(_)));
    assert!(h.queue.submissions().await.is_empty());
}

// ============ Named Query Tests ============

#[tokio::test]
async fn test_named_query_results_are_unioned() {
    let template = "SELECT DATA_NAME WHERE META_DATA_ATTR_VALUE < 'TIME_CHECK_STRING' AND RESC_NAME IN (RESOURCE_NAME_LIST)";
    let fixture = tiers_fixture()
        .with_resource_metadata("fast", &attrs().query, template, "")
        .with_query_result(template, &["/z/by_query", "/z/both"])
        .with_replica("/z/by_query", "fast")
        .with_access_time("/z/by_query", NOW)
        .with_replica("/z/both", "fast")
        .with_access_time("/z/both", 0)
        .with_replica("/z/by_time", "fast")
        .with_access_time("/z/by_time", NOW - 100);
    let h = harness(fixture);

    let violations = h.engine.find_violations_at("fast", NOW).await.unwrap();
    let paths: Vec<&str> = violations.iter().map(|v| v.object_path.as_str()).collect();
    assert_eq!(paths, vec!["/z/both", "/z/by_time", "/z/by_query"]);

    let executed = h.catalog.executed_queries().await;
    assert_eq!(executed.len(), 1);
    assert_eq!(
        executed[0].text,
        format!(
            "SELECT DATA_NAME WHERE META_DATA_ATTR_VALUE < '{}' AND RESC_NAME IN ('fast')",
            NOW - 60
        )
    );
}

#[tokio::test]
async fn test_specific_query_with_never_retention() {
    let fixture = CatalogFixture::new()
        .with_tier("fast", "tiers", 0)
        .with_tier("slow", "tiers", 1)
        .with_resource_metadata("fast", &attrs().time, "never", "")
        .with_resource_metadata("fast", &attrs().query, "archive_candidates", "specific")
        .with_query_result("archive_candidates", &["/z/picked"])
        .with_replica("/z/picked", "fast")
        .with_replica("/z/ancient", "fast")
        .with_access_time("/z/ancient", 0);
    let h = harness(fixture);

    let report = h.engine.run_policy_for_group_at("tiers", NOW).await.unwrap();
    assert_eq!(report.job_count(), 1);
    assert_eq!(report.jobs[0].job.object_path, "/z/picked");

    let executed = h.catalog.executed_queries().await;
    assert_eq!(executed[0].kind, QueryKind::Specific);
    assert_eq!(executed[0].args, vec!["0", "fast"]);
}

#[tokio::test]
async fn test_unknown_named_query_aborts_sweep() {
    let fixture = tiers_fixture().with_resource_metadata("fast", &attrs().query, "nope", "");
    let h = harness(fixture);

    let err = h.engine.run_policy_for_group_at("tiers", NOW).await.unwrap_err();
    assert!(matches!(err, TieringError::Catalog(_)));
}

// ============ Topology Tests ============

#[tokio::test]
async fn test_resolve_partitions_membership() {
    let fixture = CatalogFixture::new()
        .with_child("repl", "r1")
        .with_child("repl", "r2")
        .with_tier("repl", "g", 0)
        .with_tier("ssd", "g", 0)
        .with_tier("disk", "g", 5)
        .with_tier("tape", "g", 9)
        .with_tier("other", "unrelated", 1);
    let h = harness(fixture);

    let group = h.engine.resolve_topology("g").await.unwrap();
    assert_eq!(group.tier_count(), 3);

    let mut members: Vec<&str> = group.members();
    members.sort();
    assert_eq!(members, vec!["disk", "repl", "ssd", "tape"]);

    let all_leaves: Vec<String> = group.levels.values().flat_map(|l| l.leaves()).collect();
    let unique: BTreeSet<&String> = all_leaves.iter().collect();
    assert_eq!(all_leaves.len(), unique.len());
    assert_eq!(
        group.levels[&0].leaves().into_iter().collect::<Vec<_>>(),
        vec!["r1", "r2", "ssd"]
    );
}

#[tokio::test]
async fn test_leaf_resolves_to_itself() {
    let h = harness(tiers_fixture());
    let group = h.engine.resolve_topology("tiers").await.unwrap();
    assert_eq!(
        group.levels[&1].leaves().into_iter().collect::<Vec<_>>(),
        vec!["slow"]
    );
}

// ============ Restage and Access Time Tests ============

#[tokio::test]
async fn test_restage_on_minimum_tier_dispatches_nothing() {
    let fixture = tiers_fixture().with_replica("/z/o1", "fast");
    let h = harness(fixture);

    let outcome = h.engine.restage(RestageRequest::new("/z/o1")).await.unwrap();
    assert!(matches!(outcome, RestageOutcome::AlreadyResident { .. }));
    assert!(h.queue.submissions().await.is_empty());
}

#[tokio::test]
async fn test_restage_from_coordinating_tier() {
    let fixture = CatalogFixture::new()
        .with_child("fast_repl", "ssd1")
        .with_child("fast_repl", "ssd2")
        .with_tier("fast_repl", "tiers", 0)
        .with_tier("slow", "tiers", 1)
        .with_resource_metadata("fast_repl", &attrs().data_movement_parameters, "<EF>1s</EF>", "")
        .with_replica("/z/cold", "slow");
    let h = harness(fixture);

    let outcome = h
        .engine
        .restage(RestageRequest::from_resource("/z/cold", "slow"))
        .await
        .unwrap();
    let RestageOutcome::Dispatched(dispatched) = outcome else {
        panic!("expected a dispatched job");
    };
    assert_eq!(dispatched.job.destination_resource, "ssd1");
    assert_eq!(dispatched.job.movement_params, "<EF>1s</EF>");
    assert!(!dispatched.job.preserve_replicas);
}

#[tokio::test]
async fn test_touched_object_is_no_longer_a_violation() {
    let fixture = tiers_fixture()
        .with_replica("/z/o1", "fast")
        .with_access_time("/z/o1", NOW - 3_600);
    let h = harness(fixture);

    assert_eq!(h.engine.find_violations_at("fast", NOW).await.unwrap().len(), 1);

    h.engine.update_access_time_at("/z/o1", NOW).await.unwrap();
    assert!(h
        .engine
        .find_violations_at("fast", NOW)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_find_violations_is_deterministic() {
    let mut fixture = tiers_fixture();
    for i in 0..20 {
        let path = format!("/z/d{:02}", i);
        fixture = fixture
            .with_replica(&path, "fast")
            .with_access_time(&path, NOW - 1_000 - (i % 4));
    }
    let h = harness(fixture);

    let first = h.engine.find_violations_at("fast", NOW).await.unwrap();
    let second = h.engine.find_violations_at("fast", NOW).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].access_time, Some(NOW - 1_003));
}

// ============ Fixture Loading Tests ============

#[tokio::test]
async fn test_sweep_from_json_fixture() {
    let json = r#"{
        "resources": {
            "fast": {
                "metadata": [
                    {"attribute": "irods::storage_tiering::group", "value": "tiers", "unit": "0"},
                    {"attribute": "irods::storage_tiering::time", "value": "60", "unit": ""}
                ]
            },
            "slow": {
                "metadata": [
                    {"attribute": "irods::storage_tiering::group", "value": "tiers", "unit": "1"}
                ]
            }
        },
        "objects": {
            "/z/o1": {
                "replicas": ["fast"],
                "metadata": [{"attribute": "irods::access_time", "value": "100", "unit": ""}]
            }
        }
    }"#;
    let h = harness(CatalogFixture::from_json(json).unwrap());

    let report = h.engine.run_policy_for_group_at("tiers", NOW).await.unwrap();
    assert_eq!(report.job_count(), 1);

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["state"]["state"], "done");
    assert_eq!(value["jobs"][0]["job"]["destination_resource"], "slow");
}
