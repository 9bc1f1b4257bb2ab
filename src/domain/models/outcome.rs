// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::models::capture::Phase;
use crate::domain::models::comparison::{ComparisonResult, ComparisonStatus};
use crate::domain::models::marker::KnownGoodMarker;
use crate::domain::models::page::PageRecord;
use crate::domain::models::run::RunMode;
use crate::utils::errors::VrtError;

/// 站点流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Pending,
    HealthCheck,
    Discover,
    CaptureBaseline,
    Checkpoint,
    ApplyUpdate,
    PostUpdateHealthCheck,
    CaptureAfter,
    Compare,
    Rollback,
    PostRollbackHealthCheck,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Pending => "pending",
            PipelineStage::HealthCheck => "health_check",
            PipelineStage::Discover => "discover",
            PipelineStage::CaptureBaseline => "capture_baseline",
            PipelineStage::Checkpoint => "checkpoint",
            PipelineStage::ApplyUpdate => "apply_update",
            PipelineStage::PostUpdateHealthCheck => "post_update_health_check",
            PipelineStage::CaptureAfter => "capture_after",
            PipelineStage::Compare => "compare",
            PipelineStage::Rollback => "rollback",
            PipelineStage::PostRollbackHealthCheck => "post_rollback_health_check",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 站点运行终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    Done,
    Failed,
}

/// 站点级对比结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteVerdict {
    Ok,
    Ng,
}

/// 健康检查结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub stage: PipelineStage,
    pub healthy: bool,
    pub detail: String,
    pub checked_at: DateTime<Utc>,
}

/// 更新结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub success: bool,
    pub detail: String,
}

/// 回滚结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    /// 使用的已知良好标记，缺失时为空
    pub marker: Option<KnownGoodMarker>,
    /// 是否实际调用了回滚
    pub executed: bool,
    pub success: bool,
    pub detail: String,
}

/// 单页截图记录
///
/// baseline/after 模式下每个页面一条，替代对比结果作为页面的终态记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub page_id: String,
    pub url: String,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaptureRecord {
    pub fn failed(page: &PageRecord, phase: Phase, error: &VrtError) -> Self {
        Self {
            page_id: page.page_id.clone(),
            url: page.url.clone(),
            phase,
            storage_key: None,
            width: 0,
            height: 0,
            error_kind: Some(error.kind().to_string()),
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 站点运行结果，编排器收集的基本单位
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteOutcome {
    pub site_id: String,
    pub status: SiteStatus,
    /// 仅在执行了对比时存在
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<SiteVerdict>,
    pub critical_regression: bool,
    /// 依次经过的阶段
    pub stages: Vec<PipelineStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<PipelineStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub pages: Vec<PageRecord>,
    pub captures: Vec<CaptureRecord>,
    pub comparisons: Vec<ComparisonResult>,
    pub health_checks: Vec<HealthReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdateOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SiteOutcome {
    /// 刚进入流水线的站点，阶段轨迹为空
    pub fn new(site_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            site_id: site_id.into(),
            status: SiteStatus::Done,
            verdict: None,
            critical_regression: false,
            stages: Vec::new(),
            failed_stage: None,
            error_kind: None,
            error: None,
            pages: Vec::new(),
            captures: Vec::new(),
            comparisons: Vec::new(),
            health_checks: Vec::new(),
            update: None,
            rollback: None,
            started_at: now,
            finished_at: now,
        }
    }

    /// 未进入流水线即失败的站点（例如紧急停止后被跳过）
    pub fn failed_before_start(site_id: impl Into<String>, error: &VrtError) -> Self {
        let now = Utc::now();
        Self {
            site_id: site_id.into(),
            status: SiteStatus::Failed,
            verdict: None,
            critical_regression: false,
            stages: vec![PipelineStage::Pending, PipelineStage::Failed],
            failed_stage: Some(PipelineStage::Pending),
            error_kind: Some(error.kind().to_string()),
            error: Some(error.to_string()),
            pages: Vec::new(),
            captures: Vec::new(),
            comparisons: Vec::new(),
            health_checks: Vec::new(),
            update: None,
            rollback: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn is_ng(&self) -> bool {
        self.verdict == Some(SiteVerdict::Ng)
    }

    pub fn count_pages(&self, status: ComparisonStatus) -> usize {
        self.comparisons.iter().filter(|c| c.status == status).count()
    }

    pub fn rollback_executed(&self) -> bool {
        self.rollback.as_ref().is_some_and(|r| r.executed)
    }
}

/// 批次汇总
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch_id: String,
    pub run_date: NaiveDate,
    pub mode: RunMode,
    pub total_sites: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub ng_count: usize,
    pub critical_count: usize,
    pub rollback_count: usize,
    pub pages_ok: usize,
    pub pages_ng: usize,
    pub pages_missing: usize,
    pub pages_error: usize,
    pub pages_dimension_mismatch: usize,
    pub capture_failures: usize,
    pub emergency_stopped: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<SiteOutcome>,
}

impl BatchSummary {
    /// 由站点结果汇总计数
    pub fn from_outcomes(
        batch_id: impl Into<String>,
        run_date: NaiveDate,
        mode: RunMode,
        emergency_stopped: bool,
        started_at: DateTime<Utc>,
        outcomes: Vec<SiteOutcome>,
    ) -> Self {
        let mut summary = Self {
            batch_id: batch_id.into(),
            run_date,
            mode,
            total_sites: outcomes.len(),
            success_count: 0,
            failure_count: 0,
            ng_count: 0,
            critical_count: 0,
            rollback_count: 0,
            pages_ok: 0,
            pages_ng: 0,
            pages_missing: 0,
            pages_error: 0,
            pages_dimension_mismatch: 0,
            capture_failures: 0,
            emergency_stopped,
            started_at,
            finished_at: Utc::now(),
            outcomes: Vec::new(),
        };

        for outcome in &outcomes {
            match outcome.status {
                SiteStatus::Done => summary.success_count += 1,
                SiteStatus::Failed => summary.failure_count += 1,
            }
            if outcome.is_ng() {
                summary.ng_count += 1;
            }
            if outcome.critical_regression {
                summary.critical_count += 1;
            }
            if outcome.rollback_executed() {
                summary.rollback_count += 1;
            }
            for comparison in &outcome.comparisons {
                match comparison.status {
                    ComparisonStatus::Ok => summary.pages_ok += 1,
                    ComparisonStatus::Ng => summary.pages_ng += 1,
                    ComparisonStatus::MissingAfter => summary.pages_missing += 1,
                    ComparisonStatus::Error => summary.pages_error += 1,
                    ComparisonStatus::DimensionMismatch => summary.pages_dimension_mismatch += 1,
                }
            }
            summary.capture_failures += outcome.captures.iter().filter(|c| !c.is_success()).count();
        }

        summary.outcomes = outcomes;
        summary
    }

    /// 是否存在需要关注的问题，通知策略 `on_issues` 依据此标志
    pub fn has_issues(&self) -> bool {
        self.failure_count > 0
            || self.ng_count > 0
            || self.critical_count > 0
            || self.pages_missing > 0
            || self.pages_error > 0
            || self.pages_dimension_mismatch > 0
            || self.capture_failures > 0
            || self.emergency_stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::comparison::ComparisonResult;

    fn comparison(page: &str, status: ComparisonStatus, pct: Option<f64>) -> ComparisonResult {
        ComparisonResult {
            page_id: page.to_string(),
            status,
            diff_percentage: pct,
            diff_pixel_count: 0,
            total_pixels: 100,
            diff_image: None,
            diff_image_key: None,
            threshold: 2.0,
            error_kind: None,
            error: None,
        }
    }

    fn done_outcome(site: &str, comparisons: Vec<ComparisonResult>) -> SiteOutcome {
        let mut outcome =
            SiteOutcome::failed_before_start(site, &VrtError::Internal("unused".into()));
        outcome.status = SiteStatus::Done;
        outcome.failed_stage = None;
        outcome.error = None;
        outcome.error_kind = None;
        outcome.verdict = Some(
            if comparisons.iter().any(|c| c.status == ComparisonStatus::Ng) {
                SiteVerdict::Ng
            } else {
                SiteVerdict::Ok
            },
        );
        outcome.comparisons = comparisons;
        outcome
    }

    #[test]
    fn test_summary_counts_pages_by_status() {
        let outcomes = vec![
            done_outcome(
                "a",
                vec![
                    comparison("index", ComparisonStatus::Ok, Some(0.0)),
                    comparison("about", ComparisonStatus::MissingAfter, None),
                ],
            ),
            done_outcome("b", vec![comparison("index", ComparisonStatus::Ng, Some(5.0))]),
            SiteOutcome::failed_before_start("c", &VrtError::ResourceExhausted("stop".into())),
        ];
        let summary = BatchSummary::from_outcomes(
            "batch",
            Utc::now().date_naive(),
            RunMode::Compare,
            true,
            Utc::now(),
            outcomes,
        );

        assert_eq!(summary.total_sites, 3);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.ng_count, 1);
        assert_eq!(summary.pages_ok, 1);
        assert_eq!(summary.pages_ng, 1);
        assert_eq!(summary.pages_missing, 1);
        assert!(summary.has_issues());
    }

    #[test]
    fn test_missing_page_is_an_issue_even_without_ng() {
        let outcomes = vec![done_outcome(
            "a",
            vec![comparison("about", ComparisonStatus::MissingAfter, None)],
        )];
        let summary = BatchSummary::from_outcomes(
            "batch",
            Utc::now().date_naive(),
            RunMode::Compare,
            false,
            Utc::now(),
            outcomes,
        );
        assert_eq!(summary.ng_count, 0);
        assert_eq!(summary.pages_ok, 0);
        assert!(summary.has_issues());
    }

    #[test]
    fn test_skipped_site_reports_pending_stage() {
        let outcome =
            SiteOutcome::failed_before_start("a", &VrtError::ResourceExhausted("cpu".into()));
        assert_eq!(outcome.failed_stage, Some(PipelineStage::Pending));
        assert_eq!(outcome.error_kind.as_deref(), Some("resource_exhausted"));
    }
}
