// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::outcome::BatchSummary;

/// 通知策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    Always,
    #[default]
    OnIssues,
    Never,
}

impl NotifyPolicy {
    /// 是否需要针对该汇总发送通知
    pub fn should_notify(&self, summary: &BatchSummary) -> bool {
        match self {
            NotifyPolicy::Always => true,
            NotifyPolicy::OnIssues => summary.has_issues(),
            NotifyPolicy::Never => false,
        }
    }
}

/// 批次汇总通知协作方
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 发送批次汇总
    async fn notify(&self, summary: &BatchSummary) -> Result<()>;
}
