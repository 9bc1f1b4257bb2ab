// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::models::capture::Viewport;
use crate::engines::traits::{EngineError, PageDriver};

/// 浏览上下文工厂
///
/// 浏览上下文是相互隔离的会话（独立的 cookie 与缓存），由池负责复用
#[async_trait]
pub trait ContextFactory: Send + Sync + 'static {
    type Context: Send + Sync + 'static;

    /// 创建新的浏览上下文
    async fn create(&self) -> Result<Self::Context, EngineError>;

    /// 在上下文中打开一个页面
    async fn open_page(
        &self,
        context: &Self::Context,
        viewport: Viewport,
    ) -> Result<Box<dyn PageDriver>, EngineError>;

    /// 销毁上下文
    async fn destroy(&self, context: Self::Context);
}

/// 池状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub max_size: usize,
    pub in_use: usize,
    pub idle: usize,
    pub created: usize,
    pub reused: usize,
}

struct PoolInner<F: ContextFactory> {
    factory: Arc<F>,
    idle: Mutex<Vec<F::Context>>,
    permits: Arc<Semaphore>,
    max_size: usize,
    created: AtomicUsize,
    reused: AtomicUsize,
}

/// 浏览上下文池
///
/// 上下文按次借出，用完归还而不是销毁。池大小即同时打开的上下文上限
pub struct ContextPool<F: ContextFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ContextFactory> Clone for ContextPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: ContextFactory> ContextPool<F> {
    pub fn new(factory: Arc<F>, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                factory,
                idle: Mutex::new(Vec::with_capacity(max_size)),
                permits: Arc::new(Semaphore::new(max_size)),
                max_size,
                created: AtomicUsize::new(0),
                reused: AtomicUsize::new(0),
            }),
        }
    }

    pub fn factory(&self) -> &Arc<F> {
        &self.inner.factory
    }

    /// 借出一个上下文，池满时等待归还
    pub async fn checkout(&self) -> Result<PooledContext<F>, EngineError> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Other("context pool is closed".to_string()))?;

        let idle = self.inner.idle.lock().pop();
        let context = match idle {
            Some(context) => {
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                context
            }
            None => {
                let context = self.inner.factory.create().await?;
                self.inner.created.fetch_add(1, Ordering::Relaxed);
                context
            }
        };

        Ok(PooledContext {
            inner: self.inner.clone(),
            context: Some(context),
            discard: false,
            _permit: permit,
        })
    }

    /// 关闭池并销毁所有空闲上下文，之后的借出请求会失败
    pub async fn close(&self) {
        self.inner.permits.close();
        let idle: Vec<F::Context> = std::mem::take(&mut *self.inner.idle.lock());
        for context in idle {
            self.inner.factory.destroy(context).await;
        }
    }

    pub fn stats(&self) -> PoolStats {
        let available = if self.inner.permits.is_closed() {
            self.inner.max_size
        } else {
            self.inner.permits.available_permits()
        };
        PoolStats {
            max_size: self.inner.max_size,
            in_use: self.inner.max_size.saturating_sub(available),
            idle: self.inner.idle.lock().len(),
            created: self.inner.created.load(Ordering::Relaxed),
            reused: self.inner.reused.load(Ordering::Relaxed),
        }
    }
}

/// 借出的上下文，drop 时归还到池中
pub struct PooledContext<F: ContextFactory> {
    inner: Arc<PoolInner<F>>,
    context: Option<F::Context>,
    discard: bool,
    _permit: OwnedSemaphorePermit,
}

impl<F: ContextFactory> PooledContext<F> {
    /// 标记上下文已损坏，归还时销毁而不是放回池中
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl<F: ContextFactory> Deref for PooledContext<F> {
    type Target = F::Context;

    fn deref(&self) -> &Self::Target {
        match &self.context {
            Some(context) => context,
            // only taken in drop
            None => unreachable!("pooled context accessed after release"),
        }
    }
}

impl<F: ContextFactory> Drop for PooledContext<F> {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };

        if !self.discard && !self.inner.permits.is_closed() {
            self.inner.idle.lock().push(context);
            return;
        }

        let factory = self.inner.factory.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    factory.destroy(context).await;
                });
            }
            Err(_) => {
                tracing::warn!("No runtime available, dropping browsing context without cleanup");
            }
        }
    }
}
