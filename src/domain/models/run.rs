// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 运行模式
///
/// - baseline: 只采集变更前截图并记录已知良好标记
/// - after: 只采集变更后截图
/// - compare: 对比已存储的两组截图
/// - full: 完整的 健康检查 → 基线 → 更新 → 对比 → 回滚 流程
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Baseline,
    After,
    Compare,
    #[default]
    Full,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Baseline => "baseline",
            RunMode::After => "after",
            RunMode::Compare => "compare",
            RunMode::Full => "full",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "baseline" => Ok(RunMode::Baseline),
            "after" => Ok(RunMode::After),
            "compare" => Ok(RunMode::Compare),
            "full" => Ok(RunMode::Full),
            other => Err(format!("unknown run mode: {}", other)),
        }
    }
}

/// 调用方给出的运行选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    pub mode: RunMode,
    /// full 模式下是否执行更新
    #[serde(default)]
    pub auto_update: bool,
    /// 严重回归时是否自动回滚
    #[serde(default)]
    pub rollback_on_critical: bool,
    /// 站点级并发上限覆盖
    #[serde(default)]
    pub site_concurrency: Option<usize>,
    /// 页面级并发上限覆盖
    #[serde(default)]
    pub page_concurrency: Option<usize>,
    /// compare 模式使用的基线日期，默认为运行日期
    #[serde(default)]
    pub baseline_date: Option<NaiveDate>,
    /// compare 模式使用的对比日期，默认为运行日期
    #[serde(default)]
    pub after_date: Option<NaiveDate>,
}

/// 一次批次运行的上下文，在批次开始时确定，之后只读
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub batch_id: String,
    pub run_date: NaiveDate,
    pub options: RunOptions,
}

impl RunContext {
    pub fn new(options: RunOptions) -> Self {
        Self {
            batch_id: Uuid::new_v4().to_string(),
            run_date: Utc::now().date_naive(),
            options,
        }
    }

    pub fn with_run_date(mut self, run_date: NaiveDate) -> Self {
        self.run_date = run_date;
        self
    }

    pub fn baseline_date(&self) -> NaiveDate {
        self.options.baseline_date.unwrap_or(self.run_date)
    }

    pub fn after_date(&self) -> NaiveDate {
        self.options.after_date.unwrap_or(self.run_date)
    }
}
