// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::info;

use crate::{
    application::{
        dto::run_request::RunRequestDto, use_cases::run_batch_use_case::RunBatchUseCase,
    },
    presentation::errors::AppError,
};

/// 执行一个批次并返回汇总（含每个站点的结果）
pub async fn create_run(
    Extension(use_case): Extension<Arc<RunBatchUseCase>>,
    Json(payload): Json<RunRequestDto>,
) -> Result<impl IntoResponse, AppError> {
    info!(mode = %payload.mode, sites = ?payload.sites, "Run requested");
    let summary = use_case.execute(payload).await?;
    Ok((StatusCode::OK, Json(summary)))
}
