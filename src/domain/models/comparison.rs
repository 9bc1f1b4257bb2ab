// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::errors::VrtError;

/// 页面对比状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonStatus {
    /// 差异不超过阈值
    Ok,
    /// 差异超过阈值
    Ng,
    /// 缺少基线或对比截图
    MissingAfter,
    /// 尺寸不一致且未归一化
    DimensionMismatch,
    /// 解码或其他错误
    Error,
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ComparisonStatus::Ok => "OK",
            ComparisonStatus::Ng => "NG",
            ComparisonStatus::MissingAfter => "MISSING_AFTER",
            ComparisonStatus::DimensionMismatch => "DIMENSION_MISMATCH",
            ComparisonStatus::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// 单页对比结果
///
/// 每次运行每个页面一条，生成后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    /// 页面标识
    pub page_id: String,
    /// 状态
    pub status: ComparisonStatus,
    /// 差异百分比（高精度保留）
    pub diff_percentage: Option<f64>,
    /// 差异像素数
    pub diff_pixel_count: u64,
    /// 参与比较的像素总数
    pub total_pixels: u64,
    /// 差异图（PNG），持久化后只保留存储键
    #[serde(skip)]
    pub diff_image: Option<Vec<u8>>,
    /// 差异图存储键
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_image_key: Option<String>,
    /// 使用的阈值
    pub threshold: f64,
    /// 错误代码
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// 错误详情
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComparisonResult {
    /// 由错误构造终态结果，状态由错误类型决定
    pub fn from_error(page_id: impl Into<String>, threshold: f64, error: &VrtError) -> Self {
        let status = match error {
            VrtError::MissingBaseline(_) | VrtError::MissingAfter(_) => {
                ComparisonStatus::MissingAfter
            }
            VrtError::DimensionMismatch { .. } => ComparisonStatus::DimensionMismatch,
            _ => ComparisonStatus::Error,
        };
        Self {
            page_id: page_id.into(),
            status,
            diff_percentage: None,
            diff_pixel_count: 0,
            total_pixels: 0,
            diff_image: None,
            diff_image_key: None,
            threshold,
            error_kind: Some(error.kind().to_string()),
            error: Some(error.to_string()),
        }
    }

    /// 展示用的百分比（两位小数）
    pub fn display_percentage(&self) -> String {
        match self.diff_percentage {
            Some(p) => format!("{:.2}%", p),
            None => "-".to_string(),
        }
    }

    /// 是否超过给定阈值
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.diff_percentage.is_some_and(|p| p > threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_errors_map_to_missing_after() {
        let result =
            ComparisonResult::from_error("home", 2.0, &VrtError::MissingBaseline("home".into()));
        assert_eq!(result.status, ComparisonStatus::MissingAfter);
        assert_eq!(result.error_kind.as_deref(), Some("missing_baseline"));
        assert!(result.diff_percentage.is_none());
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&ComparisonStatus::MissingAfter).unwrap();
        assert_eq!(json, "\"MISSING_AFTER\"");
        assert_eq!(ComparisonStatus::Ng.to_string(), "NG");
    }

    #[test]
    fn test_display_percentage_rounds() {
        let mut result =
            ComparisonResult::from_error("home", 2.0, &VrtError::Internal("x".into()));
        result.diff_percentage = Some(1.23456);
        assert_eq!(result.display_percentage(), "1.23%");
        assert!(!result.exceeds(2.0));
        assert!(result.exceeds(1.0));
    }
}
