// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::marker::KnownGoodMarker;
use crate::domain::models::site::Site;

/// 健康检查结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub detail: String,
}

impl HealthStatus {
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: true,
            detail: detail.into(),
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
        }
    }
}

/// 更新结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub success: bool,
    pub detail: String,
}

/// 回滚结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub success: bool,
    pub detail: String,
}

/// 站点维护协作方
///
/// 健康检查、更新、回滚与检查点都是外部动作（包管理命令、远程执行、HTTP 回调），
/// 流水线只负责编排并解释其结果。调用可能很慢，也可能失败
#[async_trait]
pub trait MaintenanceService: Send + Sync {
    /// 探测站点健康状况
    async fn health_check(&self, site: &Site) -> Result<HealthStatus>;

    /// 对站点执行更新
    async fn apply_update(&self, site: &Site) -> Result<UpdateResult>;

    /// 回滚到指定的已知良好状态
    async fn rollback(&self, site: &Site, marker: &KnownGoodMarker) -> Result<RollbackResult>;

    /// 记录当前状态作为检查点，返回可用于回滚的引用；不支持时返回 `None`
    async fn checkpoint(&self, site: &Site) -> Result<Option<String>>;
}
