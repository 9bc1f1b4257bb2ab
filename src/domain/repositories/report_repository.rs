// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::models::outcome::{BatchSummary, SiteOutcome};
use crate::utils::errors::RepositoryError;

/// 运行报告仓库
///
/// 编排器在汇总完成后调用，失败只记录日志，不影响批次结果
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// 持久化单个站点结果
    async fn save_outcome(
        &self,
        run_date: NaiveDate,
        batch_id: &str,
        outcome: &SiteOutcome,
    ) -> Result<(), RepositoryError>;

    /// 持久化批次汇总
    async fn save_summary(&self, summary: &BatchSummary) -> Result<(), RepositoryError>;

    /// 读取批次汇总
    async fn find_summary(
        &self,
        run_date: NaiveDate,
        batch_id: &str,
    ) -> Result<Option<BatchSummary>, RepositoryError>;
}
