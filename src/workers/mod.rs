// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供并发控制与后台循环
/// 包括自适应并发预算、分批执行器、资源采样循环和工作器生命周期管理
pub mod concurrency_controller;
pub mod manager;
pub mod resource_monitor;
pub mod wave_runner;
pub mod worker;

pub use worker::Worker;
