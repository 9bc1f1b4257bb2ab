// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 端到端场景：编排器 + 站点流水线 + 内存存储

use std::collections::{HashMap, HashSet};

use wpvrt::domain::models::capture::Phase;
use wpvrt::domain::models::comparison::ComparisonStatus;
use wpvrt::domain::models::outcome::{PipelineStage, SiteStatus, SiteVerdict};
use wpvrt::domain::models::run::RunMode;
use wpvrt::domain::models::site::{CrawlLimits, Site};
use wpvrt::domain::repositories::marker_repository::MarkerRepository;
use wpvrt::domain::repositories::report_repository::ReportRepository;

use super::helpers::{
    context, rig, shop, three_page_site, MaintenanceCall, PathRobots, PngCaptureEngine,
    ScriptedMaintenance, SiteMap,
};

#[tokio::test]
async fn identical_captures_produce_a_clean_batch() {
    let rig = rig(
        three_page_site(),
        PathRobots::default(),
        PngCaptureEngine::default(),
        ScriptedMaintenance::default(),
    );
    let ctx = context(RunMode::Full, true, true);

    let summary = rig.orchestrator.run_batch(vec![shop()], &ctx).await;

    assert_eq!(summary.total_sites, 1);
    assert_eq!(summary.success_count, 1);
    assert_eq!(summary.ng_count, 0);
    assert_eq!(summary.critical_count, 0);
    assert_eq!(summary.pages_ok, 3);
    assert!(!summary.has_issues());

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.verdict, Some(SiteVerdict::Ok));
    assert_eq!(outcome.comparisons.len(), 3);
    for comparison in &outcome.comparisons {
        assert_eq!(comparison.status, ComparisonStatus::Ok);
        assert_eq!(comparison.diff_percentage, Some(0.0));
    }

    // clean run confirms the checkpoint taken before the update
    let marker = rig.markers.latest("shop").await.unwrap().unwrap();
    assert_eq!(marker.reference, "backup-2025-06-01.sql");
    assert!(marker.verified_at.is_some());

    let stored = rig
        .reports
        .find_summary(ctx.run_date, &ctx.batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.batch_id, summary.batch_id);
    assert_eq!(stored.pages_ok, 3);
}

#[tokio::test]
async fn missing_after_capture_is_reported_separately_from_ok() {
    let engine = PngCaptureEngine {
        after_failures: HashSet::from(["pricing".to_string()]),
        ..Default::default()
    };
    let rig = rig(
        three_page_site(),
        PathRobots::default(),
        engine,
        ScriptedMaintenance::default(),
    );

    let summary = rig
        .orchestrator
        .run_batch(vec![shop()], &context(RunMode::Full, true, true))
        .await;
    let outcome = &summary.outcomes[0];

    let pricing = outcome
        .comparisons
        .iter()
        .find(|c| c.page_id == "pricing")
        .unwrap();
    assert_eq!(pricing.status, ComparisonStatus::MissingAfter);
    assert_eq!(pricing.error_kind.as_deref(), Some("missing_after"));
    assert_eq!(pricing.diff_percentage, None);

    // no NG pages, so the site verdict stays OK but the missing page is not counted as OK
    assert_eq!(outcome.verdict, Some(SiteVerdict::Ok));
    assert_eq!(outcome.count_pages(ComparisonStatus::Ok), 2);
    assert_eq!(summary.pages_ok, 2);
    assert_eq!(summary.pages_missing, 1);
    assert_eq!(summary.capture_failures, 1);
    assert!(summary.has_issues());
}

#[tokio::test]
async fn missing_after_capture_does_not_mask_an_ng_page() {
    let engine = PngCaptureEngine {
        // 2 of 40 columns = 5%, above the 2% threshold
        after_changes: HashMap::from([("about".to_string(), 2)]),
        after_failures: HashSet::from(["pricing".to_string()]),
        ..Default::default()
    };
    let rig = rig(
        three_page_site(),
        PathRobots::default(),
        engine,
        ScriptedMaintenance::default(),
    );

    let summary = rig
        .orchestrator
        .run_batch(vec![shop()], &context(RunMode::Full, true, true))
        .await;
    let outcome = &summary.outcomes[0];

    assert_eq!(outcome.verdict, Some(SiteVerdict::Ng));
    assert!(!outcome.critical_regression);
    assert_eq!(summary.ng_count, 1);
    assert_eq!(summary.critical_count, 0);
    assert_eq!(summary.pages_ng, 1);
    assert_eq!(summary.pages_missing, 1);
    assert!(outcome.rollback.is_none());
}

#[tokio::test]
async fn critical_regression_rolls_back_and_rechecks_health() {
    let engine = PngCaptureEngine {
        // 6 of 40 columns = 15%, above the 10% critical threshold
        after_changes: HashMap::from([("about".to_string(), 6)]),
        ..Default::default()
    };
    let rig = rig(
        three_page_site(),
        PathRobots::default(),
        engine,
        ScriptedMaintenance::default(),
    );

    let summary = rig
        .orchestrator
        .run_batch(vec![shop()], &context(RunMode::Full, true, true))
        .await;
    let outcome = &summary.outcomes[0];

    let about = outcome
        .comparisons
        .iter()
        .find(|c| c.page_id == "about")
        .unwrap();
    let diff = about.diff_percentage.unwrap();
    assert!((diff - 15.0).abs() < 0.01, "unexpected diff {}", diff);

    assert!(outcome.critical_regression);
    assert_eq!(outcome.status, SiteStatus::Done);
    assert!(outcome.rollback_executed());
    assert!(outcome.stages.ends_with(&[
        PipelineStage::Rollback,
        PipelineStage::PostRollbackHealthCheck,
        PipelineStage::Done,
    ]));
    assert_eq!(summary.critical_count, 1);
    assert_eq!(summary.rollback_count, 1);
    assert_eq!(
        rig.maintenance.calls(),
        vec![
            MaintenanceCall::Health,
            MaintenanceCall::Checkpoint,
            MaintenanceCall::Update,
            MaintenanceCall::Health,
            MaintenanceCall::Rollback("backup-2025-06-01.sql".to_string()),
            MaintenanceCall::Health,
        ]
    );
}

#[tokio::test]
async fn failed_rollback_still_runs_post_rollback_health_check() {
    let engine = PngCaptureEngine {
        after_changes: HashMap::from([("index".to_string(), 8)]),
        ..Default::default()
    };
    let maintenance = ScriptedMaintenance {
        rollback_succeeds: false,
        ..Default::default()
    };
    let rig = rig(three_page_site(), PathRobots::default(), engine, maintenance);

    let summary = rig
        .orchestrator
        .run_batch(vec![shop()], &context(RunMode::Full, true, true))
        .await;
    let outcome = &summary.outcomes[0];

    assert_eq!(outcome.status, SiteStatus::Failed);
    assert_eq!(outcome.failed_stage, Some(PipelineStage::Rollback));
    assert_eq!(outcome.error_kind.as_deref(), Some("rollback_failed"));
    let rollback = outcome.rollback.as_ref().unwrap();
    assert!(rollback.executed);
    assert!(!rollback.success);
    assert!(outcome
        .health_checks
        .iter()
        .any(|h| h.stage == PipelineStage::PostRollbackHealthCheck));
    assert_eq!(rig.maintenance.calls().last(), Some(&MaintenanceCall::Health));
    assert_eq!(summary.failure_count, 1);
}

#[tokio::test]
async fn robots_disallowed_links_are_never_visited_or_captured() {
    let links: Vec<String> = (1..=10).map(|i| format!("/p{}/", i)).collect();
    let mut pages: Vec<(String, Vec<String>)> = vec![("/".to_string(), links.clone())];
    for link in &links {
        // every child page links one level deeper
        pages.push((link.clone(), vec![format!("{}child/", link)]));
        pages.push((format!("{}child/", link), vec![]));
    }
    let pages: Vec<(&str, Vec<String>)> = pages
        .iter()
        .map(|(path, links)| (path.as_str(), links.clone()))
        .collect();

    let rig = rig(
        SiteMap::new(&pages),
        PathRobots::disallow(&["/p3/", "/p7/"]),
        PngCaptureEngine::default(),
        ScriptedMaintenance::default(),
    );
    let mut site = Site::new("docs", "https://docs.example.com/");
    site.limits = CrawlLimits {
        max_urls: 50,
        max_depth: 2,
    };

    let summary = rig
        .orchestrator
        .run_batch(vec![site], &context(RunMode::Baseline, false, false))
        .await;
    let outcome = &summary.outcomes[0];

    // root + 8 allowed pages + their 8 children
    assert_eq!(outcome.pages.len(), 17);
    let visited = rig.fetcher.visited();
    for blocked in ["/p3/", "/p3/child/", "/p7/", "/p7/child/"] {
        assert!(!visited.iter().any(|p| p == blocked), "{} was fetched", blocked);
    }

    let captured: Vec<String> = rig
        .engine
        .captured()
        .into_iter()
        .map(|(phase, page_id)| {
            assert_eq!(phase, Phase::Baseline);
            page_id
        })
        .collect();
    assert_eq!(captured.len(), 17);
    assert!(!captured.iter().any(|id| id.starts_with("p3") || id.starts_with("p7")));
    assert!(captured.contains(&"p4_child".to_string()));
}

#[tokio::test]
async fn compare_mode_reads_previous_captures_without_collaborators() {
    let engine = PngCaptureEngine {
        after_changes: HashMap::from([("pricing".to_string(), 1)]),
        ..Default::default()
    };
    let rig = rig(
        three_page_site(),
        PathRobots::default(),
        engine,
        ScriptedMaintenance::default(),
    );

    rig.orchestrator
        .run_batch(vec![shop()], &context(RunMode::Baseline, false, false))
        .await;
    rig.orchestrator
        .run_batch(vec![shop()], &context(RunMode::After, false, false))
        .await;
    let calls_before_compare = rig.maintenance.calls().len();

    let summary = rig
        .orchestrator
        .run_batch(vec![shop()], &context(RunMode::Compare, false, false))
        .await;
    let outcome = &summary.outcomes[0];

    assert_eq!(outcome.comparisons.len(), 3);
    // one column of 40 is 2.5%
    assert_eq!(outcome.count_pages(ComparisonStatus::Ng), 1);
    assert_eq!(outcome.verdict, Some(SiteVerdict::Ng));
    assert_eq!(rig.maintenance.calls().len(), calls_before_compare);
    assert!(!rig.storage.is_empty().await);
}
