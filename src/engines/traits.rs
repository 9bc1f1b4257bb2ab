// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::domain::models::capture::{Capture, Phase, Viewport};
use crate::domain::models::page::PageRecord;
use crate::utils::errors::VrtError;

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 页面导航失败
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    /// 超时
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
    /// 浏览器或浏览上下文故障，对应的上下文不应再复用
    #[error("Browser error: {0}")]
    Browser(String),
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

impl EngineError {
    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::RequestFailed(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            EngineError::Timeout(_) => true,
            _ => false,
        }
    }

    /// 上下文是否已损坏，需要丢弃而不是归还到池中
    pub fn poisons_context(&self) -> bool {
        matches!(self, EngineError::Browser(_) | EngineError::Timeout(_))
    }
}

impl From<EngineError> for VrtError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Navigation { url, reason } => VrtError::NavigationError { url, reason },
            EngineError::RequestFailed(e) => VrtError::NavigationError {
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
                reason: e.to_string(),
            },
            EngineError::Timeout(d) => VrtError::NavigationError {
                url: String::new(),
                reason: format!("timed out after {:?}", d),
            },
            EngineError::Browser(msg) | EngineError::Other(msg) => VrtError::Internal(msg),
        }
    }
}

/// 链接发现阶段获取到的页面
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// 跟随重定向后的最终URL
    pub final_url: Url,
    /// HTTP状态码
    pub status_code: u16,
    /// HTML内容
    pub html: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// 页面获取特质，供链接发现器使用
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// 获取页面内容
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, EngineError>;

    /// 引擎名称
    fn name(&self) -> &'static str;
}

/// 单个浏览器页面的底层操作
///
/// 稳定化状态机只通过该特质驱动页面，便于替换实现
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 导航并等待 load 事件
    async fn navigate(&self, url: &str) -> Result<(), EngineError>;

    /// 执行脚本并返回 JSON 结果，脚本无返回值时为 `Null`
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, EngineError>;

    /// 整页 PNG 截图
    async fn screenshot(&self) -> Result<Vec<u8>, EngineError>;

    /// 关闭页面
    async fn close(&self);
}

/// 截图请求
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub site_id: String,
    pub page: PageRecord,
    pub phase: Phase,
    pub viewport: Viewport,
}

/// 站点级截图会话
///
/// 会话内的截图共享一个浏览上下文池，会话结束时调用 `close` 释放全部上下文
#[async_trait]
pub trait CaptureSession: Send + Sync {
    /// 截取已稳定的整页截图
    async fn capture(&self, request: &CaptureRequest) -> Result<Capture, EngineError>;

    /// 释放会话持有的资源
    async fn close(&self);
}

/// 截图引擎特质
#[async_trait]
pub trait CaptureEngine: Send + Sync {
    /// 为站点打开截图会话，`pool_size` 为浏览上下文池上限
    async fn open_session(
        &self,
        site_id: &str,
        pool_size: usize,
    ) -> Result<Arc<dyn CaptureSession>, EngineError>;

    /// 引擎名称
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_error_maps_to_vrt_navigation() {
        let err: VrtError = EngineError::Navigation {
            url: "https://example.com/".into(),
            reason: "net::ERR_NAME_NOT_RESOLVED".into(),
        }
        .into();
        assert_eq!(err.kind(), "navigation_error");
    }

    #[test]
    fn test_poisoned_contexts() {
        assert!(EngineError::Browser("crashed".into()).poisons_context());
        assert!(!EngineError::Navigation {
            url: String::new(),
            reason: String::new()
        }
        .poisons_context());
        assert!(EngineError::Timeout(Duration::from_secs(1)).is_retryable());
    }
}
