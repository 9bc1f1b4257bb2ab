// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::Mutex;
use sysinfo::{
    CpuRefreshKind, MemoryRefreshKind, Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind,
    System,
};

use crate::domain::models::resource::ResourceSnapshot;
use crate::utils::errors::WorkerError;
use crate::workers::resource_monitor::ResourceProbe;

/// 基于 sysinfo 的系统资源采样
///
/// CPU 使用率需要两次刷新之间的间隔才有意义，首个样本可能偏低
pub struct SystemProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        system.refresh_cpu_all();
        system.refresh_memory();

        Self {
            system: Mutex::new(system),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemProbe {
    fn sample(&self) -> Result<ResourceSnapshot, WorkerError> {
        let mut sys = self.system.lock();
        sys.refresh_cpu_all();
        sys.refresh_memory();

        let cpu = sys.global_cpu_usage() as f64;
        let total = sys.total_memory();
        if total == 0 {
            return Err(WorkerError::Probe("total memory reported as zero".into()));
        }
        let memory = sys.used_memory() as f64 / total as f64 * 100.0;

        let process_memory = match self.pid {
            Some(pid) => {
                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[pid]),
                    true,
                    ProcessRefreshKind::nothing().with_memory(),
                );
                sys.process(pid).map(|p| p.memory()).unwrap_or(0)
            }
            None => 0,
        };

        Ok(ResourceSnapshot::new(cpu, memory, process_memory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_within_bounds() {
        let probe = SystemProbe::new();
        let snapshot = probe.sample().unwrap();
        assert!((0.0..=100.0).contains(&snapshot.memory_usage_percent));
        assert!(snapshot.cpu_usage_percent >= 0.0);
    }
}
