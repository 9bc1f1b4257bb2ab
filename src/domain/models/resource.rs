// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 系统资源快照
///
/// 由并发控制器的采样循环写入滚动窗口
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    /// 系统 CPU 使用率 (0-100)
    pub cpu_usage_percent: f64,
    /// 系统内存使用率 (0-100)
    pub memory_usage_percent: f64,
    /// 本进程内存占用（字节）
    pub process_memory_bytes: u64,
    /// 采样时间
    pub timestamp: DateTime<Utc>,
}

impl ResourceSnapshot {
    pub fn new(cpu_usage_percent: f64, memory_usage_percent: f64, process_memory_bytes: u64) -> Self {
        Self {
            cpu_usage_percent,
            memory_usage_percent,
            process_memory_bytes,
            timestamp: Utc::now(),
        }
    }
}
