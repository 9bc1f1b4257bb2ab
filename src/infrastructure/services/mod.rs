// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 外部协作方实现模块
///
/// 包括站点维护（命令 / 回调 / HTTP 健康探测）与批次通知
pub mod maintenance_impl;
pub mod webhook_notifier;
