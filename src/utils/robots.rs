// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Result;
use reqwest::Client;
use robotstxt::DefaultMatcher;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use async_trait::async_trait;

use crate::utils::clock::{Clock, SystemClock};
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::ttl_cache::TtlCache;

/// Robots.txt检查器接口
#[async_trait]
pub trait RobotsCheckerTrait: Send + Sync {
    /// 检查URL是否被允许访问
    async fn is_allowed(&self, url_str: &str, user_agent: &str) -> Result<bool>;
}

/// robots.txt 抓取的单次失败
#[derive(Debug)]
enum FetchFailure {
    /// 服务端错误或网络错误，可重试
    Transient(String),
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailure::Transient(msg) => write!(f, "{}", msg),
        }
    }
}

/// Robots.txt检查器
///
/// 内容按 robots.txt 地址缓存，缓存归检查器自身所有
pub struct RobotsChecker {
    /// HTTP客户端
    client: Client,

    /// 内存缓存，键为 robots.txt 地址
    cache: TtlCache<String, String>,

    /// 重试策略
    retry_policy: RetryPolicy,

    /// 单次抓取超时
    fetch_timeout: Duration,

    /// 抓取 robots.txt 时发送的 User-Agent，应与匹配规则时使用的一致
    user_agent: String,
}

#[async_trait]
impl RobotsCheckerTrait for RobotsChecker {
    async fn is_allowed(&self, url_str: &str, user_agent: &str) -> Result<bool> {
        let url = Url::parse(url_str)?;
        let content = self.get_robots_content(&url).await?;
        let mut matcher = DefaultMatcher::default();
        Ok(matcher.one_agent_allowed_by_robots(&content, user_agent, url.as_str()))
    }
}

impl Default for RobotsChecker {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl RobotsChecker {
    /// 创建新的Robots检查器实例
    pub fn new(cache_ttl: Duration) -> Self {
        Self::with_clock(cache_ttl, Arc::new(SystemClock))
    }

    /// 使用注入的时钟创建检查器
    pub fn with_clock(cache_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            client: Client::new(),
            cache: TtlCache::with_clock(cache_ttl, clock),
            retry_policy: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_secs(2),
                max_backoff: Duration::from_secs(10),
                ..Default::default()
            },
            fetch_timeout: Duration::from_secs(5),
            user_agent: "wpvrt-bot/1.0".to_string(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// robots.txt 地址
    pub fn robots_url(url: &Url) -> Result<String> {
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid URL: missing host"))?;
        let port = url.port_or_known_default().unwrap_or(80);
        Ok(format!("{}://{}:{}/robots.txt", url.scheme(), host, port))
    }

    /// 获取Robots.txt内容（带缓存）
    async fn get_robots_content(&self, url: &Url) -> Result<String> {
        let robots_url = Self::robots_url(url)?;

        if let Some(content) = self.cache.get(&robots_url) {
            return Ok(content);
        }

        let fetched = self
            .retry_policy
            .run("robots_fetch", |_| self.fetch_once(&robots_url))
            .await;

        let content = match fetched {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to fetch robots.txt from {}: {}", robots_url, err);
                // Persistent failure means no usable policy; allow everything
                String::new()
            }
        };

        self.cache.insert(robots_url, content.clone());
        Ok(content)
    }

    async fn fetch_once(&self, robots_url: &str) -> Result<String, FetchFailure> {
        let response = self
            .client
            .get(robots_url)
            .header("User-Agent", self.user_agent.as_str())
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| FetchFailure::Transient(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(response.text().await.unwrap_or_default())
        } else if status.is_server_error() {
            Err(FetchFailure::Transient(format!("Server error: {}", status)))
        } else {
            // 404 and other client errors mean there is no policy to honor
            Ok(String::new())
        }
    }
}
