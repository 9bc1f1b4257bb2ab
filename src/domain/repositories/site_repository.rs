// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;

use crate::domain::models::site::Site;
use crate::utils::errors::RepositoryError;

/// 站点注册表
///
/// 站点定义在启动时加载一次，运行期间只读
#[async_trait]
pub trait SiteRepository: Send + Sync {
    /// 返回全部站点，保持注册顺序
    async fn list(&self) -> Result<Vec<Site>, RepositoryError>;

    /// 按标识查找站点
    async fn find(&self, site_id: &str) -> Result<Option<Site>, RepositoryError>;
}
