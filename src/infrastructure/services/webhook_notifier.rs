// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::outcome::BatchSummary;
use crate::domain::services::notifier::Notifier;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// 通知负载，只携带汇总计数与出问题的站点
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationPayload<'a> {
    event: &'static str,
    batch_id: &'a str,
    run_date: String,
    mode: &'static str,
    has_issues: bool,
    total_sites: usize,
    success_count: usize,
    failure_count: usize,
    ng_count: usize,
    critical_count: usize,
    rollback_count: usize,
    pages_missing: usize,
    pages_error: usize,
    emergency_stopped: bool,
    failed_sites: Vec<&'a str>,
    ng_sites: Vec<&'a str>,
}

impl<'a> NotificationPayload<'a> {
    fn from_summary(summary: &'a BatchSummary) -> Self {
        Self {
            event: "batch.completed",
            batch_id: &summary.batch_id,
            run_date: summary.run_date.format("%Y-%m-%d").to_string(),
            mode: summary.mode.as_str(),
            has_issues: summary.has_issues(),
            total_sites: summary.total_sites,
            success_count: summary.success_count,
            failure_count: summary.failure_count,
            ng_count: summary.ng_count,
            critical_count: summary.critical_count,
            rollback_count: summary.rollback_count,
            pages_missing: summary.pages_missing,
            pages_error: summary.pages_error,
            emergency_stopped: summary.emergency_stopped,
            failed_sites: summary
                .outcomes
                .iter()
                .filter(|o| o.error.is_some())
                .map(|o| o.site_id.as_str())
                .collect(),
            ng_sites: summary
                .outcomes
                .iter()
                .filter(|o| o.is_ng())
                .map(|o| o.site_id.as_str())
                .collect(),
        }
    }
}

/// Webhook 通知实现
///
/// 负载以 HMAC-SHA256 签名，签名内容为 `{timestamp}.{body}`
pub struct WebhookNotifier {
    /// HTTP 客户端
    client: reqwest::Client,
    /// 接收地址
    url: String,
    /// 签名密钥
    secret: String,
}

impl WebhookNotifier {
    /// 创建新的 Webhook 通知器
    pub fn new(url: String, secret: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            secret,
        })
    }

    /// 为负载生成签名
    pub fn generate_signature(&self, payload: &str, timestamp: i64) -> Result<String> {
        let message = format!("{}.{}", timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| anyhow!("invalid signing key: {}", e))?;
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, summary: &BatchSummary) -> Result<()> {
        let timestamp = chrono::Utc::now().timestamp();
        let payload_str = serde_json::to_string(&NotificationPayload::from_summary(summary))?;
        let signature = self.generate_signature(&payload_str, timestamp)?;

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Wpvrt-Signature", signature)
            .header("X-Wpvrt-Timestamp", timestamp.to_string())
            .header("X-Wpvrt-Batch-ID", summary.batch_id.as_str())
            .body(payload_str)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(anyhow!(
                "Notification delivery failed with status {}: {}",
                status,
                body
            ))
        }
    }
}

/// 未配置通知地址时使用，只记录日志
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, summary: &BatchSummary) -> Result<()> {
        tracing::info!(
            batch_id = %summary.batch_id,
            total = summary.total_sites,
            failed = summary.failure_count,
            ng = summary.ng_count,
            critical = summary.critical_count,
            "Batch summary"
        );
        Ok(())
    }
}
