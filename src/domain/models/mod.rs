// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了视觉回归流水线的核心实体，包括：
/// - 站点（site）：被测站点及其限制、更新方式
/// - 页面（page）：链接发现得到的页面记录
/// - 截图（capture）：某一阶段的页面截图
/// - 对比（comparison）：单页对比结果
/// - 结果（outcome）：站点运行结果与批次汇总
/// - 资源（resource）：系统资源快照
/// - 标记（marker）：已知良好状态标记
/// - 运行（run）：运行模式与选项
pub mod capture;
pub mod comparison;
pub mod marker;
pub mod outcome;
pub mod page;
pub mod resource;
pub mod run;
pub mod site;
