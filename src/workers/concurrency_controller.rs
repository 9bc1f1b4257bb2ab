// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::domain::models::resource::ResourceSnapshot;
use crate::utils::clock::{Clock, SystemClock};

/// 调整日志保留条数
const ADJUSTMENT_LOG_LEN: usize = 50;

/// 并发预算来源
pub trait BudgetSource: Send + Sync {
    /// 当前允许的并发数
    fn current_budget(&self) -> usize;
}

/// 停止信号来源
pub trait StopSignal: Send + Sync {
    /// 是否应停止启动新的工作
    fn should_stop(&self) -> bool;
}

/// 固定预算，不随资源变化
#[derive(Debug, Clone, Copy)]
pub struct FixedBudget(pub usize);

impl BudgetSource for FixedBudget {
    fn current_budget(&self) -> usize {
        self.0.max(1)
    }
}

/// 从不停止
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverStop;

impl StopSignal for NeverStop {
    fn should_stop(&self) -> bool {
        false
    }
}

/// 并发控制器配置
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// 控制器名称（site / page），用于日志与指标标签
    pub level: String,
    pub min_workers: usize,
    pub max_workers: usize,
    pub initial_workers: usize,
    /// 超过即降级的 CPU 使用率 (%)
    pub cpu_ceiling: f64,
    /// 超过即降级的内存使用率 (%)
    pub memory_ceiling: f64,
    /// 低于即升级的 CPU 使用率 (%)
    pub cpu_low_watermark: f64,
    /// 本进程内存上限（字节）
    pub heap_cap_bytes: u64,
    /// 每次调整的步长
    pub step: usize,
    /// 两次调整之间的冷却期
    pub cooldown: Duration,
    /// 求平均时使用的最近样本数
    pub smoothing_samples: usize,
    /// 历史窗口长度
    pub history_len: usize,
    /// 紧急停止阈值
    pub emergency_cpu: f64,
    pub emergency_memory: f64,
    /// 疑似内存泄漏的增长速率（字节/秒）
    pub leak_growth_bytes_per_sec: f64,
    /// 判定泄漏所需的最少样本数
    pub leak_min_samples: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            level: "site".to_string(),
            min_workers: 1,
            max_workers: 4,
            initial_workers: 2,
            cpu_ceiling: 80.0,
            memory_ceiling: 85.0,
            cpu_low_watermark: 50.0,
            heap_cap_bytes: 2 * 1024 * 1024 * 1024,
            step: 1,
            cooldown: Duration::from_secs(30),
            smoothing_samples: 3,
            history_len: 60,
            emergency_cpu: 97.0,
            emergency_memory: 95.0,
            leak_growth_bytes_per_sec: 1024.0 * 1024.0,
            leak_min_samples: 10,
        }
    }
}

/// 一次预算调整
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAdjustment {
    pub from: usize,
    pub to: usize,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// 控制器事件
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    BudgetChanged(BudgetAdjustment),
    EmergencyStop { level: String, reason: String },
    LeakSuspected { level: String, growth_bytes_per_sec: f64 },
}

/// 并发预算
///
/// 唯一的写入方是控制器的调整例程，读取方只做原子读
#[derive(Debug)]
pub struct WorkerBudget {
    current: AtomicUsize,
    log: Mutex<VecDeque<BudgetAdjustment>>,
}

impl WorkerBudget {
    fn new(initial: usize) -> Self {
        Self {
            current: AtomicUsize::new(initial),
            log: Mutex::new(VecDeque::with_capacity(ADJUSTMENT_LOG_LEN)),
        }
    }

    pub fn get(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    fn set(&self, adjustment: BudgetAdjustment) {
        self.current.store(adjustment.to, Ordering::Release);
        let mut log = self.log.lock();
        if log.len() == ADJUSTMENT_LOG_LEN {
            log.pop_front();
        }
        log.push_back(adjustment);
    }

    pub fn adjustments(&self) -> Vec<BudgetAdjustment> {
        self.log.lock().iter().cloned().collect()
    }
}

/// 控制器状态快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub level: String,
    pub budget: usize,
    pub min_workers: usize,
    pub max_workers: usize,
    pub emergency_stop: bool,
    pub leak_suspected: bool,
    pub latest: Option<ResourceSnapshot>,
    pub samples: usize,
    pub adjustments: Vec<BudgetAdjustment>,
}

/// 并发控制器
///
/// 维护有界的资源历史，按规则增减并发预算；紧急停止标志与调整例程相互独立
pub struct ConcurrencyController {
    config: ControllerConfig,
    budget: WorkerBudget,
    history: RwLock<VecDeque<ResourceSnapshot>>,
    latest_cpu: AtomicU64,
    latest_memory: AtomicU64,
    emergency: AtomicBool,
    leak_suspected: AtomicBool,
    last_adjusted: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<ControllerEvent>,
}

impl ConcurrencyController {
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(mut config: ControllerConfig, clock: Arc<dyn Clock>) -> Self {
        config.min_workers = config.min_workers.max(1);
        config.max_workers = config.max_workers.max(config.min_workers);
        config.step = config.step.max(1);
        let initial = config
            .initial_workers
            .clamp(config.min_workers, config.max_workers);
        let (events, _) = broadcast::channel(64);

        gauge!("vrt_worker_budget", "level" => config.level.clone()).set(initial as f64);

        Self {
            budget: WorkerBudget::new(initial),
            history: RwLock::new(VecDeque::with_capacity(config.history_len)),
            latest_cpu: AtomicU64::new(0f64.to_bits()),
            latest_memory: AtomicU64::new(0f64.to_bits()),
            emergency: AtomicBool::new(false),
            leak_suspected: AtomicBool::new(false),
            last_adjusted: Mutex::new(None),
            clock,
            events,
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn budget(&self) -> &WorkerBudget {
        &self.budget
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// 最近一次采样的 CPU 使用率，可能略有滞后
    pub fn latest_cpu(&self) -> f64 {
        f64::from_bits(self.latest_cpu.load(Ordering::Relaxed))
    }

    pub fn latest_memory(&self) -> f64 {
        f64::from_bits(self.latest_memory.load(Ordering::Relaxed))
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency.load(Ordering::Acquire)
    }

    pub fn is_leak_suspected(&self) -> bool {
        self.leak_suspected.load(Ordering::Relaxed)
    }

    /// 清除紧急停止标志，在新批次开始时调用
    pub fn reset_emergency(&self) {
        if self.emergency.swap(false, Ordering::AcqRel) {
            tracing::info!(level = %self.config.level, "Emergency stop cleared");
        }
    }

    /// 写入一条采样，并更新泄漏判定
    pub fn record_sample(&self, snapshot: ResourceSnapshot) {
        self.latest_cpu
            .store(snapshot.cpu_usage_percent.to_bits(), Ordering::Relaxed);
        self.latest_memory
            .store(snapshot.memory_usage_percent.to_bits(), Ordering::Relaxed);

        {
            let mut history = self.history.write();
            if history.len() >= self.config.history_len.max(1) {
                history.pop_front();
            }
            history.push_back(snapshot);
        }

        self.update_leak_suspicion();
    }

    /// 检查是否越过紧急阈值，越过时置位停止标志（批次内保持）
    pub fn check_emergency(&self, snapshot: &ResourceSnapshot) -> bool {
        let reason = if snapshot.cpu_usage_percent >= self.config.emergency_cpu {
            Some(format!(
                "cpu {:.1}% >= {:.1}%",
                snapshot.cpu_usage_percent, self.config.emergency_cpu
            ))
        } else if snapshot.memory_usage_percent >= self.config.emergency_memory {
            Some(format!(
                "memory {:.1}% >= {:.1}%",
                snapshot.memory_usage_percent, self.config.emergency_memory
            ))
        } else {
            None
        };

        if let Some(reason) = reason {
            if !self.emergency.swap(true, Ordering::AcqRel) {
                tracing::error!(level = %self.config.level, %reason, "Emergency stop raised");
                counter!("vrt_emergency_stop_total", "level" => self.config.level.clone())
                    .increment(1);
                let _ = self.events.send(ControllerEvent::EmergencyStop {
                    level: self.config.level.clone(),
                    reason,
                });
            }
        }
        self.is_emergency()
    }

    /// 按最近样本评估并在需要时调整预算
    ///
    /// 越过任一上限时按越限条件数成倍降级；CPU 低于低水位时升一级。
    /// 冷却期内只允许幅度超过一个步长的调整
    pub fn evaluate(&self) -> Option<BudgetAdjustment> {
        let (cpu, memory, heap) = self.smoothed()?;
        let current = self.budget.get();
        let step = self.config.step;

        let mut reasons = Vec::new();
        if cpu > self.config.cpu_ceiling {
            reasons.push(format!("cpu {:.1}% > {:.1}%", cpu, self.config.cpu_ceiling));
        }
        if memory > self.config.memory_ceiling {
            reasons.push(format!(
                "memory {:.1}% > {:.1}%",
                memory, self.config.memory_ceiling
            ));
        }
        if heap > self.config.heap_cap_bytes {
            reasons.push(format!(
                "process memory {} > {} bytes",
                heap, self.config.heap_cap_bytes
            ));
        }

        let (proposed, reason) = if !reasons.is_empty() {
            (
                current
                    .saturating_sub(step * reasons.len())
                    .max(self.config.min_workers),
                reasons.join(", "),
            )
        } else if cpu < self.config.cpu_low_watermark {
            (
                (current + step).min(self.config.max_workers),
                format!("cpu {:.1}% < {:.1}%", cpu, self.config.cpu_low_watermark),
            )
        } else {
            (current, String::new())
        };

        if proposed == current {
            return None;
        }

        let now = self.clock.now();
        let change = proposed.abs_diff(current);
        {
            let mut last = self.last_adjusted.lock();
            if let Some(at) = *last {
                if now.duration_since(at) < self.config.cooldown && change <= step {
                    tracing::debug!(
                        level = %self.config.level,
                        current,
                        proposed,
                        "Adjustment suppressed by cooldown"
                    );
                    return None;
                }
            }
            *last = Some(now);
        }

        let adjustment = BudgetAdjustment {
            from: current,
            to: proposed,
            reason,
            at: Utc::now(),
        };
        self.budget.set(adjustment.clone());
        gauge!("vrt_worker_budget", "level" => self.config.level.clone()).set(proposed as f64);
        tracing::info!(
            level = %self.config.level,
            from = current,
            to = proposed,
            reason = %adjustment.reason,
            "Worker budget adjusted"
        );
        let _ = self
            .events
            .send(ControllerEvent::BudgetChanged(adjustment.clone()));
        Some(adjustment)
    }

    pub fn status(&self) -> ControllerStatus {
        let history = self.history.read();
        ControllerStatus {
            level: self.config.level.clone(),
            budget: self.budget.get(),
            min_workers: self.config.min_workers,
            max_workers: self.config.max_workers,
            emergency_stop: self.is_emergency(),
            leak_suspected: self.is_leak_suspected(),
            latest: history.back().copied(),
            samples: history.len(),
            adjustments: self.budget.adjustments(),
        }
    }

    fn smoothed(&self) -> Option<(f64, f64, u64)> {
        let history = self.history.read();
        let window = self.config.smoothing_samples.max(1).min(history.len());
        if window == 0 {
            return None;
        }
        let recent = history.iter().rev().take(window);
        let (cpu, memory) = recent.fold((0.0, 0.0), |(c, m), s| {
            (c + s.cpu_usage_percent, m + s.memory_usage_percent)
        });
        let heap = history.back().map(|s| s.process_memory_bytes).unwrap_or(0);
        Some((cpu / window as f64, memory / window as f64, heap))
    }

    /// 历史窗口内进程内存的平均增长速率（字节/秒）
    pub fn heap_growth_rate(&self) -> Option<f64> {
        let history = self.history.read();
        if history.len() < self.config.leak_min_samples.max(2) {
            return None;
        }
        let first = history.front()?;
        let last = history.back()?;
        let elapsed = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
        if elapsed <= 0.0 {
            return None;
        }

        // sustained: most consecutive samples must not shrink
        let growing = history
            .iter()
            .zip(history.iter().skip(1))
            .filter(|(a, b)| b.process_memory_bytes >= a.process_memory_bytes)
            .count();
        if growing * 4 < (history.len() - 1) * 3 {
            return Some(0.0);
        }

        Some((last.process_memory_bytes as f64 - first.process_memory_bytes as f64) / elapsed)
    }

    fn update_leak_suspicion(&self) {
        let suspected = self
            .heap_growth_rate()
            .is_some_and(|rate| rate > self.config.leak_growth_bytes_per_sec);
        let previously = self.leak_suspected.swap(suspected, Ordering::Relaxed);
        if suspected && !previously {
            let rate = self.heap_growth_rate().unwrap_or_default();
            tracing::warn!(
                level = %self.config.level,
                growth_bytes_per_sec = rate,
                "Sustained process memory growth, possible leak"
            );
            counter!("vrt_leak_suspected_total", "level" => self.config.level.clone())
                .increment(1);
            let _ = self.events.send(ControllerEvent::LeakSuspected {
                level: self.config.level.clone(),
                growth_bytes_per_sec: rate,
            });
        }
    }
}

impl BudgetSource for ConcurrencyController {
    fn current_budget(&self) -> usize {
        self.budget.get()
    }
}

impl StopSignal for ConcurrencyController {
    fn should_stop(&self) -> bool {
        self.is_emergency()
    }
}

#[cfg(test)]
#[path = "concurrency_controller_test.rs"]
mod tests;
