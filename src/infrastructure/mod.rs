// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 该模块包含系统的技术实现细节，负责与外部系统的交互。
///
/// 包含的子模块：
/// - 截图存储（capture_store）：截图、元数据与差异图的键布局
/// - 可观测性（observability）：Prometheus 指标与系统资源采样
/// - 仓库实现（repositories）：站点注册表、已知良好标记与报告
/// - 协作方实现（services）：站点维护与批次通知
/// - 存储（storage）：本地文件、S3 与内存对象存储
///
/// 基础设施层遵循依赖倒置原则，依赖于领域层的抽象接口。
pub mod capture_store;
pub mod observability;
pub mod repositories;
pub mod services;
pub mod storage;
