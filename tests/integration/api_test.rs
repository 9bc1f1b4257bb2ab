// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

use wpvrt::application::use_cases::run_batch_use_case::RunBatchUseCase;
use wpvrt::domain::repositories::site_repository::SiteRepository;
use wpvrt::infrastructure::repositories::site_repo_impl::StaticSiteRepository;
use wpvrt::presentation::handlers::resource_handler::Controllers;
use wpvrt::presentation::routes;

use super::helpers::{
    rig, shop, three_page_site, PathRobots, PngCaptureEngine, ScriptedMaintenance,
};

fn app() -> Router {
    let rig = rig(
        three_page_site(),
        PathRobots::default(),
        PngCaptureEngine::default(),
        ScriptedMaintenance::default(),
    );
    let controllers = Controllers {
        site: rig.orchestrator.site_controller().clone(),
        page: rig.orchestrator.page_controller().clone(),
    };
    let sites: Arc<dyn SiteRepository> = Arc::new(StaticSiteRepository::new(vec![shop()]).unwrap());
    let use_case = Arc::new(RunBatchUseCase::new(
        sites.clone(),
        Arc::new(rig.orchestrator),
    ));
    routes::routes(use_case, sites, controllers)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_run(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/runs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// 健康检查测试
///
/// 验证健康检查端点是否正常工作
#[tokio::test]
async fn health_check_works() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn lists_registered_sites() {
    let response = app()
        .oneshot(Request::builder().uri("/v1/sites").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body[0]["id"], "shop");
    assert_eq!(body[0]["root_url"], "https://shop.example.com/");
}

#[tokio::test]
async fn resources_report_both_controllers() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/v1/resources")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["site"]["level"], "site");
    assert_eq!(body["page"]["level"], "page");
    assert_eq!(body["page"]["budget"], 3);
    assert_eq!(body["site"]["emergencyStop"], false);
}

#[tokio::test]
async fn run_returns_batch_summary() {
    let response = app()
        .oneshot(post_run(json!({ "mode": "baseline" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["mode"], "baseline");
    assert_eq!(body["totalSites"], 1);
    assert_eq!(body["successCount"], 1);
    assert_eq!(body["outcomes"][0]["siteId"], "shop");
}

#[tokio::test]
async fn run_with_unknown_site_is_not_found() {
    let response = app()
        .oneshot(post_run(json!({ "sites": ["shop", "ghost"] })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn run_with_invalid_options_is_rejected() {
    let response = app()
        .oneshot(post_run(json!({ "pageConcurrency": 0 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app()
        .oneshot(post_run(json!({
            "mode": "compare",
            "baselineDate": "2025-06-02",
            "afterDate": "2025-06-01"
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
