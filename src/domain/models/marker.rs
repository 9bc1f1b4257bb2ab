// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 最近一次已知良好状态的标记，作为回滚目标
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnownGoodMarker {
    /// 站点标识
    pub site_id: String,
    /// 协作方给出的恢复点引用（备份文件名、快照 ID 等）
    pub reference: String,
    /// 记录时间
    pub recorded_at: DateTime<Utc>,
    /// 最近一次被无差异运行确认的时间
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
}

impl KnownGoodMarker {
    pub fn new(site_id: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            reference: reference.into(),
            recorded_at: Utc::now(),
            verified_at: None,
        }
    }
}
