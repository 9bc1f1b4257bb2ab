// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::application::use_cases::run_batch_use_case::RunBatchUseCase;
use crate::domain::repositories::site_repository::SiteRepository;
use crate::presentation::handlers::{
    resource_handler::{self, Controllers},
    run_handler, site_handler,
};

/// 创建应用路由
///
/// # 参数
///
/// * `use_case` - 批次运行用例
/// * `sites` - 站点注册表
/// * `controllers` - 站点级与页面级并发控制器
pub fn routes(
    use_case: Arc<RunBatchUseCase>,
    sites: Arc<dyn SiteRepository>,
    controllers: Controllers,
) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/v1/version", get(version));

    let api_routes = Router::new()
        .route("/v1/sites", get(site_handler::list_sites))
        .route("/v1/resources", get(resource_handler::get_resources))
        .route("/v1/runs", post(run_handler::create_run))
        .layer(Extension(use_case))
        .layer(Extension(sites))
        .layer(Extension(controllers));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
///
/// # 返回值
///
/// 返回"OK"字符串
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
