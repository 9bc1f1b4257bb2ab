// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::utils::url_utils;

/// 已发现的页面
///
/// 由链接发现器创建，之后只读。`page_id` 由路径派生，
/// 用于在基线与对比截图之间配对，与截图顺序无关
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    /// 归一化后的URL
    pub url: String,
    /// 稳定页面标识
    pub page_id: String,
    /// 发现深度
    pub depth: u32,
    /// 发现阶段的加载错误（页面仍会被记录，但不再展开）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

impl PageRecord {
    pub fn new(url: &Url, depth: u32) -> Self {
        Self {
            url: url_utils::normalize_url(url).unwrap_or_else(|| url.to_string()),
            page_id: url_utils::page_id_from_url(url),
            depth,
            load_error: None,
        }
    }

    pub fn with_load_error(mut self, error: impl Into<String>) -> Self {
        self.load_error = Some(error.into());
        self
    }
}
