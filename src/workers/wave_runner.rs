// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::workers::concurrency_controller::{BudgetSource, StopSignal};

/// 单个工作项在执行中 panic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPanicked(pub String);

impl std::fmt::Display for TaskPanicked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task panicked: {}", self.0)
    }
}

/// 分批执行的结果
///
/// 结果按键重新关联，与完成顺序无关；紧急停止后未启动的工作项原样返回
#[derive(Debug)]
pub struct WaveReport<T, K, R> {
    pub results: HashMap<K, Result<R, TaskPanicked>>,
    pub skipped: Vec<T>,
    pub waves: usize,
    pub stopped: bool,
}

/// 分批并发执行器
///
/// 每一批的大小取自当前预算（可被调用方上限截断），
/// 整批全部结束后才启动下一批；停止信号只阻止新批次
#[derive(Clone)]
pub struct WaveRunner {
    label: String,
    budget: Arc<dyn BudgetSource>,
    stop: Arc<dyn StopSignal>,
    cap: Option<usize>,
    inter_wave_delay: Duration,
}

impl WaveRunner {
    pub fn new(
        label: impl Into<String>,
        budget: Arc<dyn BudgetSource>,
        stop: Arc<dyn StopSignal>,
    ) -> Self {
        Self {
            label: label.into(),
            budget,
            stop,
            cap: None,
            inter_wave_delay: Duration::ZERO,
        }
    }

    /// 调用方指定的并发上限
    pub fn with_cap(mut self, cap: Option<usize>) -> Self {
        self.cap = cap.filter(|c| *c > 0);
        self
    }

    pub fn with_inter_wave_delay(mut self, delay: Duration) -> Self {
        self.inter_wave_delay = delay;
        self
    }

    /// 当前批次大小
    pub fn wave_size(&self) -> usize {
        let budget = self.budget.current_budget().max(1);
        match self.cap {
            Some(cap) => budget.min(cap),
            None => budget,
        }
    }

    pub async fn run<T, K, R, KF, F, Fut>(&self, items: Vec<T>, key_fn: KF, work: F) -> WaveReport<T, K, R>
    where
        K: Eq + Hash + Clone,
        KF: Fn(&T) -> K,
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        let mut pending: VecDeque<T> = items.into();
        let mut results = HashMap::with_capacity(pending.len());
        let mut waves = 0;
        let mut stopped = false;

        while !pending.is_empty() {
            if self.stop.should_stop() {
                stopped = true;
                warn!(
                    runner = %self.label,
                    remaining = pending.len(),
                    "Stop signal raised, remaining items will not start"
                );
                break;
            }

            let size = self.wave_size().min(pending.len());
            let wave: Vec<T> = pending.drain(..size).collect();
            debug!(runner = %self.label, wave = waves, size, "Starting wave");

            let tasks = wave.into_iter().map(|item| {
                let key = key_fn(&item);
                let task = AssertUnwindSafe(work(item)).catch_unwind();
                async move { (key, task.await.map_err(|p| TaskPanicked(panic_message(p)))) }
            });

            for (key, result) in join_all(tasks).await {
                if let Err(panicked) = &result {
                    warn!(runner = %self.label, error = %panicked, "Wave item failed");
                }
                results.insert(key, result);
            }
            waves += 1;

            if !pending.is_empty() && !self.inter_wave_delay.is_zero() {
                tokio::time::sleep(self.inter_wave_delay).await;
            }
        }

        WaveReport {
            results,
            skipped: pending.into_iter().collect(),
            waves,
            stopped,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
