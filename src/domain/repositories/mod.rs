// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 领域层只依赖这些抽象，具体实现由基础设施层提供：
/// - 存储仓库（storage_repository）：按键寻址的对象存储
/// - 站点仓库（site_repository）：站点注册表
/// - 标记仓库（marker_repository）：已知良好标记
/// - 报告仓库（report_repository）：站点结果与批次汇总
pub mod marker_repository;
pub mod report_repository;
pub mod site_repository;
pub mod storage_repository;
