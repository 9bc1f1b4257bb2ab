// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{extract::Extension, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::workers::concurrency_controller::{ConcurrencyController, ControllerStatus};

/// 站点级与页面级控制器
#[derive(Clone)]
pub struct Controllers {
    pub site: Arc<ConcurrencyController>,
    pub page: Arc<ConcurrencyController>,
}

#[derive(Debug, Serialize)]
pub struct ResourcesResponse {
    pub site: ControllerStatus,
    pub page: ControllerStatus,
}

/// 当前预算、最近的资源样本、紧急停止与泄漏标志以及调整记录
pub async fn get_resources(
    Extension(controllers): Extension<Controllers>,
) -> Json<ResourcesResponse> {
    Json(ResourcesResponse {
        site: controllers.site.status(),
        page: controllers.page.status(),
    })
}
