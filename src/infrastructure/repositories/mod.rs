// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库实现模块
///
/// 提供领域仓库接口的具体实现
/// 站点注册表来自 YAML 文件，标记与报告写入对象存储
pub mod marker_repo_impl;
pub mod report_repo_impl;
pub mod site_repo_impl;
