// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// 初始化指标系统
///
/// 安装 Prometheus 导出器（独立 HTTP 监听）并注册流水线指标
pub fn init_metrics(listen_addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))?;

    describe_metrics();
    tracing::info!("Prometheus exporter listening on {}", listen_addr);
    Ok(())
}

/// 注册指标说明
pub fn describe_metrics() {
    describe_counter!(
        "vrt_captures_total",
        "Total number of page captures by phase and result"
    );
    describe_counter!(
        "vrt_comparisons_total",
        "Total number of page comparisons by status"
    );
    describe_counter!("vrt_rollbacks_total", "Total number of rollbacks by result");
    describe_counter!("vrt_sites_total", "Total number of site runs by final status");
    describe_gauge!(
        "vrt_worker_budget",
        "Current concurrency budget per controller level"
    );
    describe_gauge!("vrt_system_cpu_percent", "Sampled system CPU usage (0-100)");
    describe_gauge!(
        "vrt_system_memory_percent",
        "Sampled system memory usage (0-100)"
    );
    describe_counter!(
        "vrt_emergency_stop_total",
        "Number of times an emergency stop was raised"
    );
    describe_counter!(
        "vrt_leak_suspected_total",
        "Number of sustained process memory growth detections"
    );
    describe_histogram!(
        "vrt_batch_duration_seconds",
        "Duration of a batch run in seconds"
    );
}
