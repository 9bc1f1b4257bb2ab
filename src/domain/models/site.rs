// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::models::capture::Viewport;
use crate::utils::errors::VrtError;

/// 站点实体
///
/// 一次流水线运行期间不可变。凭据引用对核心逻辑不透明，只传递给维护协作方
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Site {
    /// 站点唯一标识，用于存储路径与结果关联
    pub id: String,
    /// 展示名称
    #[serde(default)]
    pub name: Option<String>,
    /// 根URL，链接发现的起点
    pub root_url: String,
    /// 爬取限制
    #[serde(default)]
    pub limits: CrawlLimits,
    /// 更新方式
    #[serde(default)]
    pub update_method: UpdateMethod,
    /// 凭据引用
    #[serde(default)]
    pub credential_ref: Option<String>,
    /// 差异阈值覆盖（百分比）
    #[serde(default)]
    pub threshold: Option<f64>,
    /// 严重差异阈值覆盖（百分比）
    #[serde(default)]
    pub critical_threshold: Option<f64>,
    /// 视口覆盖
    #[serde(default)]
    pub viewport: Option<Viewport>,
}

impl Site {
    /// 使用默认限制创建站点
    pub fn new(id: impl Into<String>, root_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            root_url: root_url.into(),
            limits: CrawlLimits::default(),
            update_method: UpdateMethod::None,
            credential_ref: None,
            threshold: None,
            critical_threshold: None,
            viewport: None,
        }
    }

    /// 校验站点定义
    pub fn validate(&self) -> Result<Url, VrtError> {
        if self.id.trim().is_empty() {
            return Err(VrtError::InvalidInput("site id cannot be empty".into()));
        }
        if self.id.contains('/') {
            return Err(VrtError::InvalidInput(format!(
                "site id '{}' must not contain '/'",
                self.id
            )));
        }
        let url = Url::parse(&self.root_url).map_err(|e| {
            VrtError::InvalidInput(format!("invalid root url '{}': {}", self.root_url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(VrtError::InvalidInput(format!(
                "root url '{}' must be http or https",
                self.root_url
            )));
        }
        if self.limits.max_urls == 0 {
            return Err(VrtError::InvalidInput("max_urls must be at least 1".into()));
        }
        Ok(url)
    }
}

/// 爬取限制
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrawlLimits {
    /// 最多发现的页面数
    pub max_urls: usize,
    /// 最大链接深度（根页面深度为 0）
    pub max_depth: u32,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        Self {
            max_urls: 20,
            max_depth: 2,
        }
    }
}

/// 更新方式描述
///
/// 命令模板与回调地址支持 `{site_id}`、`{root_url}`、`{marker}` 占位符
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateMethod {
    /// 不支持自动更新与回滚
    #[default]
    None,
    /// 本地或远程命令（例如 wp-cli over ssh）
    Command {
        update: String,
        #[serde(default)]
        rollback: Option<String>,
        #[serde(default)]
        checkpoint: Option<String>,
        /// 健康检查命令，退出码为 0 视为健康；缺省时使用 HTTP 探测
        #[serde(default)]
        health: Option<String>,
    },
    /// HTTP 回调
    Webhook {
        update_url: String,
        #[serde(default)]
        rollback_url: Option<String>,
        #[serde(default)]
        checkpoint_url: Option<String>,
    },
}
