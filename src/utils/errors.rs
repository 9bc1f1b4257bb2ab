// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

/// 视觉回归流水线错误类型
///
/// 页面级错误会被归类进 ComparisonResult，不向上传播；
/// 站点级错误只终止当前站点；只有 ResourceExhausted 会阻止后续批次启动
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VrtError {
    /// 页面加载失败
    #[error("Navigation failed for {url}: {reason}")]
    NavigationError { url: String, reason: String },

    /// robots 规则禁止访问（非错误，仅用于记录）
    #[error("Blocked by robots policy: {0}")]
    PolicyBlocked(String),

    /// 缺少基线截图
    #[error("Baseline capture missing for page {0}")]
    MissingBaseline(String),

    /// 缺少对比截图
    #[error("After capture missing for page {0}")]
    MissingAfter(String),

    /// 图片尺寸不一致且未做归一化
    #[error("Dimension mismatch: baseline {baseline:?} vs after {after:?}")]
    DimensionMismatch {
        baseline: (u32, u32),
        after: (u32, u32),
    },

    /// 图片解码失败
    #[error("Corrupted image: {0}")]
    CorruptedImage(String),

    /// 健康检查失败
    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),

    /// 更新失败
    #[error("Update failed: {0}")]
    UpdateFailed(String),

    /// 回滚失败
    #[error("Rollback failed: {0}")]
    RollbackFailed(String),

    /// 资源耗尽，触发紧急停止
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// 存储错误
    #[error("Storage error: {0}")]
    Storage(String),

    /// 无效输入
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VrtError {
    /// 稳定的错误代码，写入结果记录与报告
    pub fn kind(&self) -> &'static str {
        match self {
            VrtError::NavigationError { .. } => "navigation_error",
            VrtError::PolicyBlocked(_) => "policy_blocked",
            VrtError::MissingBaseline(_) => "missing_baseline",
            VrtError::MissingAfter(_) => "missing_after",
            VrtError::DimensionMismatch { .. } => "dimension_mismatch",
            VrtError::CorruptedImage(_) => "corrupted_image",
            VrtError::HealthCheckFailed(_) => "health_check_failed",
            VrtError::UpdateFailed(_) => "update_failed",
            VrtError::RollbackFailed(_) => "rollback_failed",
            VrtError::ResourceExhausted(_) => "resource_exhausted",
            VrtError::Storage(_) => "storage_error",
            VrtError::InvalidInput(_) => "invalid_input",
            VrtError::Internal(_) => "internal_error",
        }
    }
}

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// 后台工作器错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<crate::domain::repositories::storage_repository::StorageError> for RepositoryError {
    fn from(err: crate::domain::repositories::storage_repository::StorageError) -> Self {
        RepositoryError::Storage(err.to_string())
    }
}
