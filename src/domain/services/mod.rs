// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 该模块包含视觉回归流水线的核心业务逻辑。
///
/// 包含的服务：
/// - 差异引擎（diff_engine）：逐像素比较两张截图并生成差异图
/// - 链接发现（link_discoverer）：在站点内广度优先发现待截图页面
/// - 站点维护（maintenance_service）：健康检查、更新、回滚与检查点的协作方接口
/// - 通知（notifier）：批次汇总的通知接口与策略
/// - 编排器（orchestrator）：按资源预算分批执行站点并汇总结果
/// - 站点流水线（site_pipeline）：单个站点的阶段状态机
pub mod diff_engine;
pub mod link_discoverer;
pub mod maintenance_service;
pub mod notifier;
pub mod orchestrator;
pub mod site_pipeline;
