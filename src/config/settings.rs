// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::models::capture::Viewport;
use crate::domain::services::diff_engine::{DiffOptions, SizePolicy};
use crate::domain::services::notifier::NotifyPolicy;
use crate::domain::services::orchestrator::OrchestratorConfig;
use crate::domain::services::site_pipeline::PipelineConfig;
use crate::engines::chromium_engine::ChromiumOptions;
use crate::engines::stabilizer::StabilizerConfig;
use crate::infrastructure::services::maintenance_impl::MaintenanceConfig;
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::concurrency_controller::ControllerConfig;

/// 应用程序配置设置
///
/// 启动时解析一次，之后只读；各组件通过转换方法拿到自己的配置
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 服务器配置
    pub server: ServerSettings,
    /// 存储配置
    pub storage: StorageSettings,
    /// 站点注册表
    pub sites: SitesSettings,
    /// 浏览器配置
    #[serde(default)]
    pub browser: BrowserSettings,
    /// 截图与稳定化配置
    #[serde(default)]
    pub capture: CaptureSettings,
    /// 链接发现配置
    #[serde(default)]
    pub discovery: DiscoverySettings,
    /// 差异比较配置
    #[serde(default)]
    pub diff: DiffSettings,
    /// 并发控制配置
    pub concurrency: ConcurrencySettings,
    /// 协作方调用的重试策略
    #[serde(default)]
    pub retry: RetrySettings,
    /// 协作方调用超时
    #[serde(default)]
    pub collaborators: CollaboratorSettings,
    /// 批次通知
    #[serde(default)]
    pub notification: NotificationSettings,
    /// 指标导出
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// 存储类型 (local, s3, memory)
    pub storage_type: String,
    /// 本地存储路径 (当 type=local 时使用)
    pub local_path: Option<String>,
    /// S3 区域
    pub s3_region: Option<String>,
    /// S3 存储桶名称
    pub s3_bucket: Option<String>,
    /// S3 访问密钥
    pub s3_access_key: Option<String>,
    /// S3 密钥
    pub s3_secret_key: Option<String>,
    /// S3 端点 (可选，用于 MinIO 等兼容服务)
    pub s3_endpoint: Option<String>,
    /// 对象键前缀
    pub s3_prefix: Option<String>,
}

/// 站点注册表配置
#[derive(Debug, Clone, Deserialize)]
pub struct SitesSettings {
    /// YAML 注册表路径
    pub registry_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// 远程调试地址（ws://...），为空时启动本地 Chromium
    pub remote_debugging_url: Option<String>,
    pub request_timeout_secs: u64,
    /// 单次截图（含稳定化）的超时
    pub capture_timeout_secs: u64,
    pub extra_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            remote_debugging_url: None,
            request_timeout_secs: 30,
            capture_timeout_secs: 120,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub load_timeout_secs: u64,
    pub scroll_step_px: u32,
    pub max_scroll_steps: u32,
    pub scroll_pause_ms: u64,
    pub stable_height_checks: u32,
    pub loader_selectors: Vec<String>,
    pub loader_poll_ms: u64,
    pub loader_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub mask_selectors: Vec<String>,
    pub mask_timestamps: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        let stabilizer = StabilizerConfig::default();
        let viewport = Viewport::default();
        Self {
            viewport_width: viewport.width,
            viewport_height: viewport.height,
            load_timeout_secs: stabilizer.load_timeout.as_secs(),
            scroll_step_px: stabilizer.scroll_step_px,
            max_scroll_steps: stabilizer.max_scroll_steps,
            scroll_pause_ms: stabilizer.scroll_pause.as_millis() as u64,
            stable_height_checks: stabilizer.stable_height_checks,
            loader_selectors: stabilizer.loader_selectors,
            loader_poll_ms: stabilizer.loader_poll_interval.as_millis() as u64,
            loader_timeout_ms: stabilizer.loader_timeout.as_millis() as u64,
            settle_delay_ms: stabilizer.settle_delay.as_millis() as u64,
            mask_selectors: stabilizer.mask_selectors,
            mask_timestamps: stabilizer.mask_timestamps,
        }
    }
}

/// 链接发现使用的页面获取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetcherKind {
    /// 纯 HTTP 获取，不执行脚本
    #[default]
    Http,
    /// 通过浏览器渲染后获取
    Browser,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub user_agent: String,
    pub fetch_timeout_secs: u64,
    pub robots_cache_ttl_secs: u64,
    pub robots_fetch_timeout_secs: u64,
    pub fetcher: FetcherKind,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            user_agent: "wpvrt/0.1 (+visual-regression)".to_string(),
            fetch_timeout_secs: 15,
            robots_cache_ttl_secs: 3600,
            robots_fetch_timeout_secs: 5,
            fetcher: FetcherKind::Http,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiffSettings {
    /// 差异阈值（百分比）
    pub threshold: f64,
    /// 严重差异阈值（百分比）
    pub critical_threshold: f64,
    /// 单像素颜色距离阈值 (0-1)
    pub color_threshold: f64,
    pub include_aa: bool,
    pub size_policy: SizePolicy,
    /// 填充背景色 RGBA
    pub background: [u8; 4],
}

impl Default for DiffSettings {
    fn default() -> Self {
        let options = DiffOptions::default();
        Self {
            threshold: 2.0,
            critical_threshold: 10.0,
            color_threshold: options.color_threshold,
            include_aa: options.include_aa,
            size_policy: options.size_policy,
            background: options.background,
        }
    }
}

/// 单个并发控制器的配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub min_workers: usize,
    pub max_workers: usize,
    pub initial_workers: usize,
    pub cpu_ceiling: f64,
    pub memory_ceiling: f64,
    pub cpu_low_watermark: f64,
    pub heap_cap_mb: u64,
    pub step: usize,
    pub cooldown_secs: u64,
    pub smoothing_samples: usize,
    pub history_len: usize,
    pub emergency_cpu: f64,
    pub emergency_memory: f64,
    pub leak_growth_kb_per_sec: f64,
    pub leak_min_samples: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        let config = ControllerConfig::default();
        Self {
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            initial_workers: config.initial_workers,
            cpu_ceiling: config.cpu_ceiling,
            memory_ceiling: config.memory_ceiling,
            cpu_low_watermark: config.cpu_low_watermark,
            heap_cap_mb: config.heap_cap_bytes / (1024 * 1024),
            step: config.step,
            cooldown_secs: config.cooldown.as_secs(),
            smoothing_samples: config.smoothing_samples,
            history_len: config.history_len,
            emergency_cpu: config.emergency_cpu,
            emergency_memory: config.emergency_memory,
            leak_growth_kb_per_sec: config.leak_growth_bytes_per_sec / 1024.0,
            leak_min_samples: config.leak_min_samples,
        }
    }
}

impl ControllerSettings {
    pub fn to_config(&self, level: &str) -> ControllerConfig {
        ControllerConfig {
            level: level.to_string(),
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            initial_workers: self.initial_workers,
            cpu_ceiling: self.cpu_ceiling,
            memory_ceiling: self.memory_ceiling,
            cpu_low_watermark: self.cpu_low_watermark,
            heap_cap_bytes: self.heap_cap_mb * 1024 * 1024,
            step: self.step,
            cooldown: Duration::from_secs(self.cooldown_secs),
            smoothing_samples: self.smoothing_samples,
            history_len: self.history_len,
            emergency_cpu: self.emergency_cpu,
            emergency_memory: self.emergency_memory,
            leak_growth_bytes_per_sec: self.leak_growth_kb_per_sec * 1024.0,
            leak_min_samples: self.leak_min_samples,
        }
    }
}

/// 并发控制配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ConcurrencySettings {
    /// 站点级控制器
    pub site: ControllerSettings,
    /// 页面级控制器
    pub page: ControllerSettings,
    /// 预算调整的采样间隔（毫秒）
    pub sample_interval_ms: u64,
    /// 紧急停止的采样间隔（毫秒）
    pub emergency_interval_ms: u64,
    /// 站点批次之间的停顿（毫秒）
    pub inter_wave_delay_ms: u64,
    /// 页面批次之间的停顿（毫秒）
    pub page_wave_delay_ms: u64,
}

/// 单个协作方调用的重试配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryEntry {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryEntry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryEntry {
    fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            enable_jitter: self.jitter,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub health: RetryEntry,
    /// 更新默认不重试，重复执行更新可能不是幂等的
    pub update: RetryEntry,
    pub rollback: RetryEntry,
    pub checkpoint: RetryEntry,
    pub notify: RetryEntry,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            health: RetryEntry::attempts(3),
            update: RetryEntry::attempts(1),
            rollback: RetryEntry::attempts(2),
            checkpoint: RetryEntry::attempts(2),
            notify: RetryEntry::attempts(3),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollaboratorSettings {
    /// 更新、回滚与检查点调用的超时
    pub call_timeout_secs: u64,
    pub health_timeout_secs: u64,
    /// 超过该时长的健康响应标记为降级
    pub slow_threshold_ms: u64,
}

impl Default for CollaboratorSettings {
    fn default() -> Self {
        Self {
            call_timeout_secs: 600,
            health_timeout_secs: 15,
            slow_threshold_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// 为空时只写日志
    pub webhook_url: Option<String>,
    /// HMAC 签名密钥
    pub secret: Option<String>,
    pub policy: NotifyPolicy,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "0.0.0.0:9100".to_string(),
        }
    }
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加内置默认值、`config/default`、`config/{APP_ENVIRONMENT}` 与
    /// `WPVRT__` 前缀的环境变量（例如 `WPVRT__SERVER__PORT=8080`）
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败或取值不合法
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("WPVRT")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("browser.extra_args")
                    .with_list_parse_key("capture.mask_selectors")
                    .try_parsing(true),
            );

        Self::build(builder)
    }

    /// 只含内置默认值的构建器，其余来源由调用方叠加
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("storage.storage_type", "local")?
            .set_default("storage.local_path", "./storage")?
            .set_default("sites.registry_path", "config/sites.yaml")?
            .set_default("concurrency.site.max_workers", 4)?
            .set_default("concurrency.site.initial_workers", 2)?
            .set_default("concurrency.page.max_workers", 6)?
            .set_default("concurrency.page.initial_workers", 4)?
            .set_default("concurrency.sample_interval_ms", 5000)?
            .set_default("concurrency.emergency_interval_ms", 1000)?
            .set_default("concurrency.inter_wave_delay_ms", 2000)?
            .set_default("concurrency.page_wave_delay_ms", 0)
    }

    /// 构建并校验
    pub fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 校验跨字段约束
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.diff.threshold < 0.0 || self.diff.critical_threshold < 0.0 {
            return Err(ConfigError::Message(
                "diff thresholds must not be negative".into(),
            ));
        }
        if self.diff.critical_threshold < self.diff.threshold {
            return Err(ConfigError::Message(format!(
                "diff.critical_threshold ({}) must not be lower than diff.threshold ({})",
                self.diff.critical_threshold, self.diff.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.diff.color_threshold) {
            return Err(ConfigError::Message(
                "diff.color_threshold must be within 0..=1".into(),
            ));
        }
        for (level, controller) in [
            ("site", &self.concurrency.site),
            ("page", &self.concurrency.page),
        ] {
            if controller.min_workers == 0 || controller.min_workers > controller.max_workers {
                return Err(ConfigError::Message(format!(
                    "concurrency.{}: require 1 <= min_workers <= max_workers",
                    level
                )));
            }
        }
        if self.capture.viewport_width == 0 || self.capture.viewport_height == 0 {
            return Err(ConfigError::Message("capture viewport must not be empty".into()));
        }
        self.metrics_addr()?;
        Ok(())
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.metrics.listen_addr.parse().map_err(|e| {
            ConfigError::Message(format!(
                "invalid metrics.listen_addr '{}': {}",
                self.metrics.listen_addr, e
            ))
        })
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.capture.viewport_width,
            height: self.capture.viewport_height,
        }
    }

    pub fn stabilizer_config(&self) -> StabilizerConfig {
        let c = &self.capture;
        StabilizerConfig {
            load_timeout: Duration::from_secs(c.load_timeout_secs),
            scroll_step_px: c.scroll_step_px,
            max_scroll_steps: c.max_scroll_steps,
            scroll_pause: Duration::from_millis(c.scroll_pause_ms),
            stable_height_checks: c.stable_height_checks,
            loader_selectors: c.loader_selectors.clone(),
            loader_poll_interval: Duration::from_millis(c.loader_poll_ms),
            loader_timeout: Duration::from_millis(c.loader_timeout_ms),
            settle_delay: Duration::from_millis(c.settle_delay_ms),
            mask_selectors: c.mask_selectors.clone(),
            mask_timestamps: c.mask_timestamps,
        }
    }

    pub fn chromium_options(&self) -> ChromiumOptions {
        ChromiumOptions {
            remote_debugging_url: self.browser.remote_debugging_url.clone(),
            request_timeout: Duration::from_secs(self.browser.request_timeout_secs),
            extra_args: self.browser.extra_args.clone(),
            capture_timeout: Duration::from_secs(self.browser.capture_timeout_secs),
        }
    }

    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            color_threshold: self.diff.color_threshold,
            include_aa: self.diff.include_aa,
            size_policy: self.diff.size_policy,
            background: self.diff.background,
            ..Default::default()
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            threshold: self.diff.threshold,
            critical_threshold: self.diff.critical_threshold,
            default_viewport: self.viewport(),
            collaborator_timeout: Duration::from_secs(self.collaborators.call_timeout_secs),
            health_retry: self.retry.health.policy(),
            update_retry: self.retry.update.policy(),
            rollback_retry: self.retry.rollback.policy(),
            checkpoint_retry: self.retry.checkpoint.policy(),
            page_wave_delay: Duration::from_millis(self.concurrency.page_wave_delay_ms),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            inter_wave_delay: Duration::from_millis(self.concurrency.inter_wave_delay_ms),
            notify_policy: self.notification.policy,
            notify_retry: self.retry.notify.policy(),
        }
    }

    pub fn maintenance_config(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            call_timeout: Duration::from_secs(self.collaborators.call_timeout_secs),
            health_timeout: Duration::from_secs(self.collaborators.health_timeout_secs),
            slow_threshold: Duration::from_millis(self.collaborators.slow_threshold_ms),
            user_agent: self.discovery.user_agent.clone(),
        }
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
