// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use image::{ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::domain::models::capture::Capture;
use crate::domain::models::comparison::{ComparisonResult, ComparisonStatus};
use crate::utils::errors::VrtError;

/// YIQ 空间中两个颜色的最大距离
const MAX_YIQ_DELTA: f64 = 35215.0;

/// 尺寸不一致时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SizePolicy {
    /// 以两图的最大宽高为画布，空白处用背景色填充后再比较
    #[default]
    Pad,
    /// 尺寸不同直接返回 DIMENSION_MISMATCH
    Strict,
}

/// 差异计算选项
#[derive(Debug, Clone, PartialEq)]
pub struct DiffOptions {
    /// 单像素颜色距离阈值 (0-1)，越小越敏感
    pub color_threshold: f64,
    /// 是否把抗锯齿像素计为差异
    pub include_aa: bool,
    pub size_policy: SizePolicy,
    /// 填充背景色
    pub background: [u8; 4],
    /// 差异像素颜色
    pub diff_color: [u8; 3],
    /// 抗锯齿像素颜色
    pub aa_color: [u8; 3],
    /// 未变化像素在差异图中的不透明度
    pub fade_alpha: f64,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            color_threshold: 0.1,
            include_aa: false,
            size_policy: SizePolicy::Pad,
            background: [255, 255, 255, 255],
            diff_color: [255, 0, 0],
            aa_color: [255, 255, 0],
            fade_alpha: 0.1,
        }
    }
}

/// 像素级比较结果
#[derive(Debug, Clone)]
pub struct PixelDiff {
    pub diff_pixels: u64,
    pub aa_pixels: u64,
    pub total_pixels: u64,
    pub width: u32,
    pub height: u32,
    pub diff_image: RgbaImage,
}

impl PixelDiff {
    pub fn percentage(&self) -> f64 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        self.diff_pixels as f64 / self.total_pixels as f64 * 100.0
    }
}

/// 差异引擎
///
/// 基于 YIQ 感知色差逐像素比较，带抗锯齿检测。无论结果是否通过都会生成差异图
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    options: DiffOptions,
}

impl DiffEngine {
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// 比较一组截图
    ///
    /// 任一截图缺失时返回 MISSING_AFTER，`error_kind` 标明缺失的一侧
    pub fn compare(
        &self,
        page_id: &str,
        baseline: Option<&Capture>,
        after: Option<&Capture>,
        threshold: f64,
    ) -> ComparisonResult {
        let (baseline, after) = match (baseline, after) {
            (None, _) => {
                return ComparisonResult::from_error(
                    page_id,
                    threshold,
                    &VrtError::MissingBaseline(page_id.to_string()),
                )
            }
            (_, None) => {
                return ComparisonResult::from_error(
                    page_id,
                    threshold,
                    &VrtError::MissingAfter(page_id.to_string()),
                )
            }
            (Some(b), Some(a)) => (b, a),
        };

        match self.compare_bytes(&baseline.image, &after.image) {
            Ok(diff) => {
                let percentage = diff.percentage();
                let diff_image = match encode_png(&diff.diff_image) {
                    Ok(bytes) => bytes,
                    Err(e) => return ComparisonResult::from_error(page_id, threshold, &e),
                };
                let status = if percentage > threshold {
                    ComparisonStatus::Ng
                } else {
                    ComparisonStatus::Ok
                };
                ComparisonResult {
                    page_id: page_id.to_string(),
                    status,
                    diff_percentage: Some(percentage),
                    diff_pixel_count: diff.diff_pixels,
                    total_pixels: diff.total_pixels,
                    diff_image: Some(diff_image),
                    diff_image_key: None,
                    threshold,
                    error_kind: None,
                    error: None,
                }
            }
            Err(e) => ComparisonResult::from_error(page_id, threshold, &e),
        }
    }

    /// 解码并比较两张图片
    pub fn compare_bytes(&self, baseline: &[u8], after: &[u8]) -> Result<PixelDiff, VrtError> {
        let baseline = decode_image(baseline, "baseline")?;
        let after = decode_image(after, "after")?;
        self.compare_images(&baseline, &after)
    }

    /// 比较两张已解码的图片
    pub fn compare_images(
        &self,
        baseline: &RgbaImage,
        after: &RgbaImage,
    ) -> Result<PixelDiff, VrtError> {
        let baseline_dims = baseline.dimensions();
        let after_dims = after.dimensions();

        if baseline_dims != after_dims && self.options.size_policy == SizePolicy::Strict {
            return Err(VrtError::DimensionMismatch {
                baseline: baseline_dims,
                after: after_dims,
            });
        }

        let width = baseline_dims.0.max(after_dims.0);
        let height = baseline_dims.1.max(after_dims.1);
        if width == 0 || height == 0 {
            return Err(VrtError::CorruptedImage("image has no pixels".to_string()));
        }

        let padded_baseline;
        let padded_after;
        let (img1, img2) = if baseline_dims == after_dims {
            (baseline, after)
        } else {
            padded_baseline = pad_to(baseline, width, height, self.options.background);
            padded_after = pad_to(after, width, height, self.options.background);
            (&padded_baseline, &padded_after)
        };

        Ok(self.pixel_diff(img1, img2))
    }

    fn pixel_diff(&self, img1: &RgbaImage, img2: &RgbaImage) -> PixelDiff {
        let (width, height) = img1.dimensions();
        let max_delta = MAX_YIQ_DELTA * self.options.color_threshold * self.options.color_threshold;
        let mut output = RgbaImage::new(width, height);
        let mut diff_pixels = 0u64;
        let mut aa_pixels = 0u64;

        for y in 0..height {
            for x in 0..width {
                let p1 = img1.get_pixel(x, y);
                let p2 = img2.get_pixel(x, y);
                let delta = if p1 == p2 {
                    0.0
                } else {
                    color_delta(p1, p2, false)
                };

                if delta.abs() > max_delta {
                    let is_aa = !self.options.include_aa
                        && (antialiased(img1, x, y, img2) || antialiased(img2, x, y, img1));
                    if is_aa {
                        aa_pixels += 1;
                        output.put_pixel(x, y, opaque(self.options.aa_color));
                    } else {
                        diff_pixels += 1;
                        output.put_pixel(x, y, opaque(self.options.diff_color));
                    }
                } else {
                    output.put_pixel(x, y, faded(p1, self.options.fade_alpha));
                }
            }
        }

        PixelDiff {
            diff_pixels,
            aa_pixels,
            total_pixels: width as u64 * height as u64,
            width,
            height,
            diff_image: output,
        }
    }
}

/// 解码图片为 RGBA
pub fn decode_image(bytes: &[u8], label: &str) -> Result<RgbaImage, VrtError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| VrtError::CorruptedImage(format!("{} image: {}", label, e)))
}

/// 编码为 PNG
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, VrtError> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| VrtError::Internal(format!("Failed to encode diff image: {}", e)))?;
    Ok(buffer)
}

fn pad_to(image: &RgbaImage, width: u32, height: u32, background: [u8; 4]) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba(background));
    for (x, y, pixel) in image.enumerate_pixels() {
        canvas.put_pixel(x, y, *pixel);
    }
    canvas
}

fn opaque(color: [u8; 3]) -> Rgba<u8> {
    Rgba([color[0], color[1], color[2], 255])
}

fn faded(pixel: &Rgba<u8>, alpha: f64) -> Rgba<u8> {
    let [r, g, b, a] = pixel.0;
    let luma = rgb2y(blend(r, a), blend(g, a), blend(b, a));
    let value = (255.0 + (luma - 255.0) * alpha).clamp(0.0, 255.0) as u8;
    Rgba([value, value, value, 255])
}

/// 半透明像素与白色混合
fn blend(channel: u8, alpha: u8) -> f64 {
    255.0 + (channel as f64 - 255.0) * (alpha as f64 / 255.0)
}

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.29889531 + g * 0.58662247 + b * 0.11448223
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.59597799 - g * 0.27417610 - b * 0.32180189
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.21147017 - g * 0.52261711 + b * 0.31114694
}

/// YIQ 色差；`y_only` 时只返回亮度差
///
/// 结果带符号：第一个像素更亮时为负
fn color_delta(p1: &Rgba<u8>, p2: &Rgba<u8>, y_only: bool) -> f64 {
    let [r1, g1, b1, a1] = p1.0;
    let [r2, g2, b2, a2] = p2.0;
    let (r1, g1, b1) = (blend(r1, a1), blend(g1, a1), blend(b1, a1));
    let (r2, g2, b2) = (blend(r2, a2), blend(g2, a2), blend(b2, a2));

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;
    if y_only {
        return y;
    }

    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;
    if y1 > y2 {
        -delta
    } else {
        delta
    }
}

fn neighborhood(x: u32, y: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
    (
        x.saturating_sub(1),
        y.saturating_sub(1),
        (x + 1).min(width - 1),
        (y + 1).min(height - 1),
    )
}

/// 判断像素是否为抗锯齿像素：周围同时存在更亮与更暗的邻居，
/// 且该邻居在两张图中都处于大片同色区域
fn antialiased(img: &RgbaImage, x1: u32, y1: u32, other: &RgbaImage) -> bool {
    let (width, height) = img.dimensions();
    let (x0, y0, x2, y2) = neighborhood(x1, y1, width, height);
    let center = img.get_pixel(x1, y1);

    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);
    let mut min = 0.0;
    let mut max = 0.0;
    let mut min_at = (0, 0);
    let mut max_at = (0, 0);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            let delta = color_delta(center, img.get_pixel(x, y), true);
            if delta == 0.0 {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_at = (x, y);
            } else if delta > max {
                max = delta;
                max_at = (x, y);
            }
        }
    }

    if min == 0.0 || max == 0.0 {
        return false;
    }

    (has_many_siblings(img, min_at.0, min_at.1) && has_many_siblings(other, min_at.0, min_at.1))
        || (has_many_siblings(img, max_at.0, max_at.1)
            && has_many_siblings(other, max_at.0, max_at.1))
}

/// 像素是否至少有三个完全相同的邻居
fn has_many_siblings(img: &RgbaImage, x1: u32, y1: u32) -> bool {
    let (width, height) = img.dimensions();
    let (x0, y0, x2, y2) = neighborhood(x1, y1, width, height);
    let center = img.get_pixel(x1, y1);
    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            if img.get_pixel(x, y) == center {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
#[path = "diff_engine_test.rs"]
mod tests;
