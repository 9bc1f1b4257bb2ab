// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::capture::Capture;
use crate::engines::browser_pool::{ContextFactory, ContextPool, PoolStats};
use crate::engines::stabilizer::PageStabilizer;
use crate::engines::traits::{CaptureRequest, CaptureSession, EngineError};

/// 基于浏览上下文池的截图会话
///
/// 每次截图借出一个上下文，在其中打开新页面、等待稳定、截图后关闭页面并归还上下文
pub struct PooledCaptureSession<F: ContextFactory> {
    pool: ContextPool<F>,
    stabilizer: PageStabilizer,
    capture_timeout: Duration,
}

impl<F: ContextFactory> PooledCaptureSession<F> {
    pub fn new(
        factory: Arc<F>,
        pool_size: usize,
        stabilizer: PageStabilizer,
        capture_timeout: Duration,
    ) -> Self {
        Self {
            pool: ContextPool::new(factory, pool_size),
            stabilizer,
            capture_timeout,
        }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    async fn capture_in_context(
        &self,
        context: &F::Context,
        request: &CaptureRequest,
    ) -> Result<Capture, EngineError> {
        let driver = self
            .pool
            .factory()
            .open_page(context, request.viewport)
            .await?;

        let result = async {
            self.stabilizer
                .settle(driver.as_ref(), &request.page.url)
                .await?;
            driver.screenshot().await
        }
        .await;
        driver.close().await;

        let image = result?;
        Ok(Capture::from_image_bytes(
            request.site_id.clone(),
            request.page.page_id.clone(),
            request.phase,
            image,
            Utc::now(),
        ))
    }
}

#[async_trait]
impl<F: ContextFactory> CaptureSession for PooledCaptureSession<F> {
    #[tracing::instrument(skip(self, request), fields(site_id = %request.site_id, page_id = %request.page.page_id, phase = %request.phase))]
    async fn capture(&self, request: &CaptureRequest) -> Result<Capture, EngineError> {
        let mut context = self.pool.checkout().await?;

        let result = match tokio::time::timeout(
            self.capture_timeout,
            self.capture_in_context(&context, request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.capture_timeout)),
        };

        if let Err(e) = &result {
            if e.poisons_context() {
                tracing::warn!(error = %e, "Discarding browsing context");
                context.discard();
            }
        }
        result
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
