// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::domain::models::marker::KnownGoodMarker;
use crate::domain::models::site::{Site, UpdateMethod};
use crate::domain::services::maintenance_service::{
    HealthStatus, MaintenanceService, RollbackResult, UpdateResult,
};

/// 输出摘要保留的最大字符数
const DETAIL_LIMIT: usize = 512;

/// 维护协作方配置
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// 更新、回滚、检查点命令或回调的超时
    pub call_timeout: Duration,
    /// 健康探测超时
    pub health_timeout: Duration,
    /// 超过该时长的健康响应标记为降级
    pub slow_threshold: Duration,
    pub user_agent: String,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(600),
            health_timeout: Duration::from_secs(15),
            slow_threshold: Duration::from_secs(5),
            user_agent: "wpvrt/0.1".to_string(),
        }
    }
}

/// 命令执行结果
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    fn detail(&self) -> String {
        let text = if self.success || self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        truncate(text.trim(), DETAIL_LIMIT)
    }
}

/// 按站点更新方式分派的维护实现
///
/// - `command`：通过 `sh -c` 执行模板命令，退出码 0 视为成功
/// - `webhook`：POST JSON 到配置的地址，2xx 视为成功，5xx 与连接错误返回 `Err` 以便重试
/// - 健康检查缺省为对根 URL 的 HTTP GET，2xx/3xx 视为健康
pub struct SiteMaintenance {
    client: reqwest::Client,
    probe_client: reqwest::Client,
    config: MaintenanceConfig,
}

impl SiteMaintenance {
    pub fn new(config: MaintenanceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.call_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build maintenance HTTP client")?;
        let probe_client = reqwest::Client::builder()
            .timeout(config.health_timeout)
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build health probe client")?;

        Ok(Self {
            client,
            probe_client,
            config,
        })
    }

    /// 替换命令模板中的占位符，替换值做 shell 单引号转义
    pub fn render_command(template: &str, site: &Site, marker: Option<&str>) -> String {
        let mut rendered = template
            .replace("{site_id}", &shell_quote(&site.id))
            .replace("{root_url}", &shell_quote(&site.root_url));
        if let Some(marker) = marker {
            rendered = rendered.replace("{marker}", &shell_quote(marker));
        }
        rendered
    }

    /// 替换回调地址中的占位符，替换值做 URL 编码
    pub fn render_url(template: &str, site: &Site, marker: Option<&str>) -> String {
        let mut rendered = template
            .replace("{site_id}", &urlencoding::encode(&site.id))
            .replace("{root_url}", &urlencoding::encode(&site.root_url));
        if let Some(marker) = marker {
            rendered = rendered.replace("{marker}", &urlencoding::encode(marker));
        }
        rendered
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        tracing::debug!(command, "Running maintenance command");
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn command: {}", command))?;

        let output = tokio::time::timeout(self.config.call_timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow!("command timed out after {:?}", self.config.call_timeout))?
            .context("failed to wait for command")?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// 发送回调，返回 (是否成功, 响应体)
    async fn post_webhook(&self, url: &str, body: serde_json::Value) -> Result<(bool, String)> {
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("webhook request to {} failed", url))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            bail!("webhook {} returned {}: {}", url, status, truncate(&text, DETAIL_LIMIT));
        }
        Ok((status.is_success(), text))
    }

    async fn probe_http(&self, site: &Site) -> Result<HealthStatus> {
        let started = Instant::now();
        let response = self
            .probe_client
            .get(&site.root_url)
            .send()
            .await
            .with_context(|| format!("health probe to {} failed", site.root_url))?;
        let elapsed = started.elapsed();
        let status = response.status();

        if status.is_server_error() {
            // server errors may be transient, let the caller retry
            bail!("health probe to {} returned {}", site.root_url, status);
        }
        if !(status.is_success() || status.is_redirection()) {
            return Ok(HealthStatus::unhealthy(format!("HTTP {}", status.as_u16())));
        }

        let detail = if elapsed > self.config.slow_threshold {
            format!(
                "HTTP {} (degraded: slow response {}ms)",
                status.as_u16(),
                elapsed.as_millis()
            )
        } else {
            format!("HTTP {} in {}ms", status.as_u16(), elapsed.as_millis())
        };
        Ok(HealthStatus::healthy(detail))
    }
}

#[async_trait]
impl MaintenanceService for SiteMaintenance {
    async fn health_check(&self, site: &Site) -> Result<HealthStatus> {
        match &site.update_method {
            UpdateMethod::Command {
                health: Some(template),
                ..
            } => {
                let output = self
                    .run_command(&Self::render_command(template, site, None))
                    .await?;
                Ok(HealthStatus {
                    healthy: output.success,
                    detail: output.detail(),
                })
            }
            _ => self.probe_http(site).await,
        }
    }

    async fn apply_update(&self, site: &Site) -> Result<UpdateResult> {
        match &site.update_method {
            UpdateMethod::None => bail!("site '{}' has no update method", site.id),
            UpdateMethod::Command { update, .. } => {
                let output = self
                    .run_command(&Self::render_command(update, site, None))
                    .await?;
                Ok(UpdateResult {
                    success: output.success,
                    detail: output.detail(),
                })
            }
            UpdateMethod::Webhook { update_url, .. } => {
                let url = Self::render_url(update_url, site, None);
                let (success, body) = self
                    .post_webhook(
                        &url,
                        json!({ "action": "update", "siteId": site.id, "rootUrl": site.root_url }),
                    )
                    .await?;
                Ok(UpdateResult {
                    success,
                    detail: truncate(body.trim(), DETAIL_LIMIT),
                })
            }
        }
    }

    async fn rollback(&self, site: &Site, marker: &KnownGoodMarker) -> Result<RollbackResult> {
        match &site.update_method {
            UpdateMethod::None => bail!("site '{}' has no rollback method", site.id),
            UpdateMethod::Command { rollback: None, .. } => {
                bail!("site '{}' has no rollback command", site.id)
            }
            UpdateMethod::Command {
                rollback: Some(template),
                ..
            } => {
                let output = self
                    .run_command(&Self::render_command(
                        template,
                        site,
                        Some(&marker.reference),
                    ))
                    .await?;
                Ok(RollbackResult {
                    success: output.success,
                    detail: output.detail(),
                })
            }
            UpdateMethod::Webhook {
                rollback_url: None, ..
            } => bail!("site '{}' has no rollback url", site.id),
            UpdateMethod::Webhook {
                rollback_url: Some(template),
                ..
            } => {
                let url = Self::render_url(template, site, Some(&marker.reference));
                let (success, body) = self
                    .post_webhook(
                        &url,
                        json!({
                            "action": "rollback",
                            "siteId": site.id,
                            "rootUrl": site.root_url,
                            "marker": marker.reference,
                        }),
                    )
                    .await?;
                Ok(RollbackResult {
                    success,
                    detail: truncate(body.trim(), DETAIL_LIMIT),
                })
            }
        }
    }

    async fn checkpoint(&self, site: &Site) -> Result<Option<String>> {
        match &site.update_method {
            UpdateMethod::Command {
                checkpoint: Some(template),
                ..
            } => {
                let output = self
                    .run_command(&Self::render_command(template, site, None))
                    .await?;
                if !output.success {
                    bail!("checkpoint command failed: {}", output.detail());
                }
                // the reference is the last non-empty line printed
                Ok(output
                    .stdout
                    .lines()
                    .map(str::trim)
                    .rfind(|line| !line.is_empty())
                    .map(str::to_string))
            }
            UpdateMethod::Webhook {
                checkpoint_url: Some(template),
                ..
            } => {
                let url = Self::render_url(template, site, None);
                let (success, body) = self
                    .post_webhook(
                        &url,
                        json!({ "action": "checkpoint", "siteId": site.id, "rootUrl": site.root_url }),
                    )
                    .await?;
                if !success {
                    bail!("checkpoint webhook rejected: {}", truncate(&body, DETAIL_LIMIT));
                }
                let reference = serde_json::from_str::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|v| v.get("reference").and_then(|r| r.as_str()).map(str::to_string))
                    .unwrap_or_else(|| body.trim().to_string());
                Ok(Some(reference).filter(|r| !r.is_empty()))
            }
            _ => Ok(None),
        }
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(limit).collect();
        truncated.push('…');
        truncated
    }
}
