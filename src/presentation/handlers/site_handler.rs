// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{extract::Extension, Json};
use std::sync::Arc;

use crate::{
    domain::{models::site::Site, repositories::site_repository::SiteRepository},
    presentation::errors::AppError,
};

/// 列出已注册站点
pub async fn list_sites(
    Extension(sites): Extension<Arc<dyn SiteRepository>>,
) -> Result<Json<Vec<Site>>, AppError> {
    Ok(Json(sites.list().await?))
}
