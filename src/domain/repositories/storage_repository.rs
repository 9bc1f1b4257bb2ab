// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 后端返回的错误
    #[error("Storage error: {0}")]
    Other(String),
}

/// 对象存储特质
///
/// 截图、差异图与报告都按键寻址，任何遵循同一键布局的后端都可以互换
#[async_trait]
pub trait StorageRepository: Send + Sync {
    /// 写入对象，已存在的键直接覆盖
    async fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// 读取对象，不存在时返回 `None`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// 列出给定前缀下的全部键（按字典序）
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}
