// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use metrics::gauge;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::domain::models::resource::ResourceSnapshot;
use crate::utils::errors::WorkerError;
use crate::workers::concurrency_controller::ConcurrencyController;
use crate::workers::worker::Worker;

/// 系统资源采样接口
pub trait ResourceProbe: Send + Sync {
    /// 采集一次 CPU / 内存快照
    fn sample(&self) -> Result<ResourceSnapshot, WorkerError>;
}

/// 预算调整循环
///
/// 按固定间隔采样，写入每个控制器的历史窗口并评估调整规则
pub struct BudgetAdjuster {
    probe: Arc<dyn ResourceProbe>,
    controllers: Vec<Arc<ConcurrencyController>>,
    interval: Duration,
}

impl BudgetAdjuster {
    pub fn new(
        probe: Arc<dyn ResourceProbe>,
        controllers: Vec<Arc<ConcurrencyController>>,
        interval: Duration,
    ) -> Self {
        Self {
            probe,
            controllers,
            interval,
        }
    }

    /// 执行一次采样与评估
    pub fn tick(&self) -> Result<ResourceSnapshot, WorkerError> {
        let snapshot = self.probe.sample()?;
        gauge!("vrt_system_cpu_percent").set(snapshot.cpu_usage_percent);
        gauge!("vrt_system_memory_percent").set(snapshot.memory_usage_percent);

        for controller in &self.controllers {
            controller.record_sample(snapshot);
            controller.evaluate();
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl Worker for BudgetAdjuster {
    async fn run(&self) -> Result<(), WorkerError> {
        info!(interval_ms = self.interval.as_millis() as u64, "Budget adjuster started");
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Err(e) = self.tick() {
                debug!(error = %e, "Resource sample failed");
            }
        }
    }

    fn name(&self) -> &str {
        "budget-adjuster"
    }
}

/// 紧急停止监视循环
///
/// 采样频率高于调整循环，只负责置位紧急停止标志
pub struct EmergencyWatcher {
    probe: Arc<dyn ResourceProbe>,
    controllers: Vec<Arc<ConcurrencyController>>,
    interval: Duration,
}

impl EmergencyWatcher {
    pub fn new(
        probe: Arc<dyn ResourceProbe>,
        controllers: Vec<Arc<ConcurrencyController>>,
        interval: Duration,
    ) -> Self {
        Self {
            probe,
            controllers,
            interval,
        }
    }

    /// 执行一次检查，返回是否有控制器处于紧急状态
    pub fn tick(&self) -> Result<bool, WorkerError> {
        let snapshot = self.probe.sample()?;
        let mut raised = false;
        for controller in &self.controllers {
            raised |= controller.check_emergency(&snapshot);
        }
        Ok(raised)
    }
}

#[async_trait]
impl Worker for EmergencyWatcher {
    async fn run(&self) -> Result<(), WorkerError> {
        info!(interval_ms = self.interval.as_millis() as u64, "Emergency watcher started");
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Err(e) = self.tick() {
                debug!(error = %e, "Emergency sample failed");
            }
        }
    }

    fn name(&self) -> &str {
        "emergency-watcher"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::concurrency_controller::ControllerConfig;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ScriptedProbe(Mutex<VecDeque<(f64, f64)>>);

    impl ScriptedProbe {
        fn new(samples: &[(f64, f64)]) -> Self {
            Self(Mutex::new(samples.iter().copied().collect()))
        }
    }

    impl ResourceProbe for ScriptedProbe {
        fn sample(&self) -> Result<ResourceSnapshot, WorkerError> {
            self.0
                .lock()
                .pop_front()
                .map(|(cpu, mem)| ResourceSnapshot::new(cpu, mem, 1024))
                .ok_or_else(|| WorkerError::Probe("exhausted".into()))
        }
    }

    fn controller(level: &str) -> Arc<ConcurrencyController> {
        Arc::new(ConcurrencyController::new(ControllerConfig {
            level: level.into(),
            initial_workers: 3,
            max_workers: 4,
            smoothing_samples: 1,
            ..ControllerConfig::default()
        }))
    }

    #[test]
    fn test_adjuster_feeds_every_controller() {
        let site = controller("site");
        let page = controller("page");
        let adjuster = BudgetAdjuster::new(
            Arc::new(ScriptedProbe::new(&[(90.0, 40.0)])),
            vec![site.clone(), page.clone()],
            Duration::from_secs(5),
        );

        adjuster.tick().unwrap();
        assert_eq!(site.budget().get(), 2);
        assert_eq!(page.budget().get(), 2);
        assert_eq!(page.status().samples, 1);
        assert!(adjuster.tick().is_err());
    }

    #[test]
    fn test_watcher_raises_emergency_only_past_ceiling() {
        let site = controller("site");
        let watcher = EmergencyWatcher::new(
            Arc::new(ScriptedProbe::new(&[(60.0, 60.0), (60.0, 99.0)])),
            vec![site.clone()],
            Duration::from_secs(1),
        );

        assert!(!watcher.tick().unwrap());
        assert!(watcher.tick().unwrap());
        assert!(site.is_emergency());
        // the slow loop did not run, so the budget is untouched
        assert_eq!(site.budget().get(), 3);
    }
}
