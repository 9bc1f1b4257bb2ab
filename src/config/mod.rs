// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 启动时解析一次的应用配置：服务器、存储、浏览器、截图、差异、并发与协作方
pub mod settings;
