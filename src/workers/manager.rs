// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::workers::worker::Worker;

/// 工作管理器
///
/// 持有后台循环的任务句柄，关闭时统一中止
#[derive(Default)]
pub struct WorkerManager {
    handles: Vec<(String, JoinHandle<()>)>,
}

impl WorkerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在独立任务中启动工作器
    pub fn spawn(&mut self, worker: Arc<dyn Worker>) {
        let name = worker.name().to_string();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                error!(worker = %task_name, error = %e, "Worker exited with error");
            }
        });
        info!(worker = %name, "Worker started");
        self.handles.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 中止所有工作器
    pub fn shutdown(&mut self) {
        info!("Shutting down workers...");
        for (name, handle) in self.handles.drain(..) {
            handle.abort();
            info!(worker = %name, "Worker stopped");
        }
    }
}

impl Drop for WorkerManager {
    fn drop(&mut self) {
        for (_, handle) in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::WorkerError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Ticker(Arc<AtomicUsize>);

    #[async_trait]
    impl Worker for Ticker {
        async fn run(&self) -> Result<(), WorkerError> {
            loop {
                self.0.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        fn name(&self) -> &str {
            "ticker"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_workers() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut manager = WorkerManager::new();
        manager.spawn(Arc::new(Ticker(ticks.clone())));
        assert_eq!(manager.len(), 1);

        tokio::time::sleep(Duration::from_millis(55)).await;
        manager.shutdown();
        assert!(manager.is_empty());

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen > 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
