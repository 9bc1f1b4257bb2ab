// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;

use crate::domain::models::marker::KnownGoodMarker;
use crate::utils::errors::RepositoryError;

/// 已知良好标记仓库
///
/// 每个站点只保留最近一次标记，回滚以它为目标
#[async_trait]
pub trait MarkerRepository: Send + Sync {
    /// 读取站点最近一次的已知良好标记
    async fn latest(&self, site_id: &str) -> Result<Option<KnownGoodMarker>, RepositoryError>;

    /// 记录（覆盖）站点的已知良好标记
    async fn record(&self, marker: &KnownGoodMarker) -> Result<(), RepositoryError>;
}
