// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::domain::models::capture::Viewport;
use crate::engines::browser_pool::ContextFactory;
use crate::engines::capture_session::PooledCaptureSession;
use crate::engines::stabilizer::{PageStabilizer, StabilizerConfig};
use crate::engines::traits::{
    CaptureEngine, CaptureSession, EngineError, FetchedPage, PageDriver, PageFetcher,
};
use url::Url;

/// Chromium 启动/连接配置
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    /// 远程调试地址，设置后连接已有实例而不是启动新进程
    pub remote_debugging_url: Option<String>,
    /// CDP 请求超时
    pub request_timeout: Duration,
    /// 额外的启动参数
    pub extra_args: Vec<String>,
    /// 单次截图（含稳定化）的超时
    pub capture_timeout: Duration,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            remote_debugging_url: None,
            request_timeout: Duration::from_secs(30),
            extra_args: Vec::new(),
            capture_timeout: Duration::from_secs(120),
        }
    }
}

struct BrowserHandle {
    browser: Arc<Browser>,
    _handler: JoinHandle<()>,
}

/// Chromium 截图引擎
///
/// 浏览器在首次打开会话时启动（或连接），之后由引擎持有并在所有会话间共享
pub struct ChromiumEngine {
    options: ChromiumOptions,
    stabilizer: StabilizerConfig,
    browser: OnceCell<BrowserHandle>,
}

impl ChromiumEngine {
    pub fn new(options: ChromiumOptions, stabilizer: StabilizerConfig) -> Self {
        Self {
            options,
            stabilizer,
            browser: OnceCell::new(),
        }
    }

    async fn browser(&self) -> Result<Arc<Browser>, EngineError> {
        let handle = self
            .browser
            .get_or_try_init(|| async {
                let (browser, mut handler) = match &self.options.remote_debugging_url {
                    Some(url) => {
                        tracing::info!("Connecting to remote Chrome instance at: {}", url);
                        Browser::connect(url.as_str()).await.map_err(|e| {
                            EngineError::Browser(format!("Failed to connect to remote Chrome: {}", e))
                        })?
                    }
                    None => {
                        let mut builder = BrowserConfig::builder()
                            .no_sandbox()
                            .request_timeout(self.options.request_timeout)
                            .arg("--disable-gpu")
                            .arg("--disable-dev-shm-usage")
                            .arg("--hide-scrollbars");
                        for arg in &self.options.extra_args {
                            builder = builder.arg(arg.as_str());
                        }
                        let config = builder.build().map_err(EngineError::Browser)?;
                        Browser::launch(config)
                            .await
                            .map_err(|e| EngineError::Browser(e.to_string()))?
                    }
                };

                let handler_task = tokio::spawn(async move {
                    while let Some(event) = handler.next().await {
                        if event.is_err() {
                            break;
                        }
                    }
                });

                Ok::<_, EngineError>(BrowserHandle {
                    browser: Arc::new(browser),
                    _handler: handler_task,
                })
            })
            .await?;
        Ok(handle.browser.clone())
    }
}

#[async_trait]
impl CaptureEngine for ChromiumEngine {
    async fn open_session(
        &self,
        site_id: &str,
        pool_size: usize,
    ) -> Result<Arc<dyn CaptureSession>, EngineError> {
        let browser = self.browser().await?;
        tracing::debug!(site_id, pool_size, "Opening chromium capture session");
        let factory = Arc::new(ChromiumContextFactory { browser });
        Ok(Arc::new(PooledCaptureSession::new(
            factory,
            pool_size,
            PageStabilizer::new(self.stabilizer.clone()),
            self.options.capture_timeout,
        )))
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

/// 以浏览器渲染后的 DOM 做链接发现，适用于链接由脚本生成的站点
///
/// CDP 不直接暴露主文档状态码，成功加载即视为 200
#[async_trait]
impl PageFetcher for ChromiumEngine {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, EngineError> {
        let browser = self.browser().await?;
        let page = browser
            .new_page(url.as_str())
            .await
            .map_err(|e| EngineError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let result = async {
            let html = page
                .content()
                .await
                .map_err(|e| EngineError::Browser(format!("Failed to read page content: {}", e)))?;
            let final_url = page
                .url()
                .await
                .ok()
                .flatten()
                .and_then(|u| Url::parse(&u).ok())
                .unwrap_or_else(|| url.clone());
            Ok(FetchedPage {
                final_url,
                status_code: 200,
                html,
            })
        }
        .await;

        if let Err(e) = page.close().await {
            tracing::debug!("Failed to close discovery page: {}", e);
        }
        result
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

/// 以 CDP 浏览上下文作为池化句柄
pub struct ChromiumContextFactory {
    browser: Arc<Browser>,
}

#[async_trait]
impl ContextFactory for ChromiumContextFactory {
    type Context = BrowserContextId;

    async fn create(&self) -> Result<BrowserContextId, EngineError> {
        let response = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| EngineError::Browser(format!("Failed to create browser context: {}", e)))?;
        Ok(response.result.browser_context_id.clone())
    }

    async fn open_page(
        &self,
        context: &BrowserContextId,
        viewport: Viewport,
    ) -> Result<Box<dyn PageDriver>, EngineError> {
        let mut params = CreateTargetParams::new("about:blank");
        params.browser_context_id = Some(context.clone());
        let page = self
            .browser
            .new_page(params)
            .await
            .map_err(|e| EngineError::Browser(e.to_string()))?;

        let driver = ChromiumPageDriver { page };
        let configured = driver
            .page
            .execute(SetDeviceMetricsOverrideParams::new(
                viewport.width as i64,
                viewport.height as i64,
                1.0,
                false,
            ))
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Browser(format!("Failed to set viewport: {}", e)));
        close_on_error(&driver, configured).await?;

        Ok(Box::new(driver))
    }

    async fn destroy(&self, context: BrowserContextId) {
        if let Err(e) = self
            .browser
            .execute(DisposeBrowserContextParams::new(context))
            .await
        {
            tracing::warn!("Failed to dispose browser context: {}", e);
        }
    }
}

/// 配置失败时关闭刚打开的页面
async fn close_on_error<T>(
    driver: &dyn PageDriver,
    result: Result<T, EngineError>,
) -> Result<T, EngineError> {
    if result.is_err() {
        driver.close().await;
    }
    result
}

/// chromiumoxide 页面驱动
pub struct ChromiumPageDriver {
    page: Page,
}

#[async_trait]
impl PageDriver for ChromiumPageDriver {
    async fn navigate(&self, url: &str) -> Result<(), EngineError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| EngineError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, EngineError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| EngineError::Browser(format!("Script evaluation failed: {}", e)))?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, EngineError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| EngineError::Browser(format!("Page screenshot failed: {}", e)))
    }

    async fn close(&self) {
        if let Err(e) = self.page.clone().close().await {
            tracing::debug!("Failed to close page: {}", e);
        }
    }
}
