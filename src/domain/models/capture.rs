// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

/// 截图阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// 变更前
    Baseline,
    /// 变更后
    After,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Baseline => "baseline",
            Phase::After => "after",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(Phase::Baseline),
            "after" => Ok(Phase::After),
            _ => Err(()),
        }
    }
}

/// 视口尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
        }
    }
}

/// 页面截图
///
/// 每次运行中每个 (页面, 阶段) 只产生一次。site_id + page_id 相同、阶段不同的两张截图构成一组对比
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    /// 站点标识
    pub site_id: String,
    /// 页面标识
    pub page_id: String,
    /// 阶段
    pub phase: Phase,
    /// 原始图片字节（PNG）
    pub image: Vec<u8>,
    /// 宽度
    pub width: u32,
    /// 高度
    pub height: u32,
    /// 截图时间
    pub captured_at: DateTime<Utc>,
}

impl Capture {
    /// 由图片字节构建截图，尺寸从图片头读取；无法识别的图片尺寸记为 0，由差异引擎在解码时报告损坏
    pub fn from_image_bytes(
        site_id: impl Into<String>,
        page_id: impl Into<String>,
        phase: Phase,
        image: Vec<u8>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        let (width, height) = read_dimensions(&image).unwrap_or((0, 0));
        Self {
            site_id: site_id.into(),
            page_id: page_id.into(),
            phase,
            image,
            width,
            height,
            captured_at,
        }
    }
}

/// 读取图片头中的尺寸信息，不做完整解码
pub fn read_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// 截图元数据，与图片一起持久化
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMeta {
    pub url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}
