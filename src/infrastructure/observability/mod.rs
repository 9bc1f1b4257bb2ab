// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 可观测性模块
///
/// Prometheus 指标导出与系统资源采样
pub mod metrics;
pub mod system_probe;
