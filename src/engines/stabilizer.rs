// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::engines::traits::{EngineError, PageDriver};

const FREEZE_ANIMATIONS_SCRIPT: &str = r#"(() => {
  const style = document.createElement('style');
  style.setAttribute('data-wpvrt', 'freeze');
  style.textContent = '*, *::before, *::after { animation: none !important; transition: none !important; caret-color: transparent !important; scroll-behavior: auto !important; }';
  (document.head || document.documentElement).appendChild(style);
  return true;
})()"#;

const SCROLL_STEP_SCRIPT: &str = r#"(() => {
  window.scrollBy(0, __STEP__);
  const height = Math.max(
    document.body ? document.body.scrollHeight : 0,
    document.documentElement ? document.documentElement.scrollHeight : 0
  );
  return { height: height, atBottom: window.scrollY + window.innerHeight >= height - 2 };
})()"#;

const LOADER_VISIBLE_SCRIPT: &str = r#"((selectors) => selectors.some((selector) => {
  try {
    return Array.from(document.querySelectorAll(selector)).some((el) => {
      const style = window.getComputedStyle(el);
      const rect = el.getBoundingClientRect();
      return style.display !== 'none' && style.visibility !== 'hidden'
        && style.opacity !== '0' && rect.width > 0 && rect.height > 0;
    });
  } catch (e) {
    return false;
  }
}))(__SELECTORS__)"#;

const MASK_SCRIPT: &str = r#"((selectors, maskTimestamps) => {
  let masked = 0;
  for (const selector of selectors) {
    try {
      document.querySelectorAll(selector).forEach((el) => {
        el.style.setProperty('visibility', 'hidden', 'important');
        masked += 1;
      });
    } catch (e) {}
  }
  if (maskTimestamps && document.body) {
    const pattern = /\d{4}[-\/.]\d{1,2}[-\/.]\d{1,2}|\d{1,2}[-\/.]\d{1,2}[-\/.]\d{2,4}|\d{1,2}:\d{2}(:\d{2})?|\d{4}年\d{1,2}月\d{1,2}日|\b(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\.? \d{1,2},? \d{4}/g;
    const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT);
    let node;
    while ((node = walker.nextNode())) {
      const parent = node.parentElement;
      if (parent && (parent.tagName === 'SCRIPT' || parent.tagName === 'STYLE')) continue;
      const text = node.nodeValue;
      if (!text) continue;
      const replaced = text.replace(pattern, (m) => m.replace(/\d/g, '0'));
      if (replaced !== text) {
        node.nodeValue = replaced;
        masked += 1;
      }
    }
  }
  return masked;
})(__SELECTORS__, __MASK_TIMESTAMPS__)"#;

const SCROLL_TO_ORIGIN_SCRIPT: &str = "(() => { window.scrollTo(0, 0); return true; })()";

/// 页面稳定化配置
#[derive(Debug, Clone)]
pub struct StabilizerConfig {
    /// 等待 load 事件的软超时
    pub load_timeout: Duration,
    /// 每次滚动的像素
    pub scroll_step_px: u32,
    /// 滚动步数上限
    pub max_scroll_steps: u32,
    /// 两次滚动之间的等待
    pub scroll_pause: Duration,
    /// 到达底部且高度连续不变的次数
    pub stable_height_checks: u32,
    /// 加载指示器选择器
    pub loader_selectors: Vec<String>,
    pub loader_poll_interval: Duration,
    /// 等待加载指示器消失的软超时
    pub loader_timeout: Duration,
    /// 截图前的固定等待
    pub settle_delay: Duration,
    /// 截图前隐藏的元素
    pub mask_selectors: Vec<String>,
    /// 是否遮盖时间戳样式的文本
    pub mask_timestamps: bool,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(30),
            scroll_step_px: 800,
            max_scroll_steps: 30,
            scroll_pause: Duration::from_millis(250),
            stable_height_checks: 2,
            loader_selectors: [
                ".loading",
                ".loader",
                ".spinner",
                ".preloader",
                "#preloader",
                ".lazyloading",
                "[aria-busy=\"true\"]",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            loader_poll_interval: Duration::from_millis(200),
            loader_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(500),
            mask_selectors: Vec::new(),
            mask_timestamps: true,
        }
    }
}

/// 稳定化状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleState {
    Loading,
    Scrolling,
    AwaitingLoaders,
    Settled,
}

/// 稳定化过程记录
///
/// 软超时只降低截图质量，不会使截图失败，这里记录发生了哪些降级
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettleReport {
    pub load_timed_out: bool,
    pub scroll_steps: u32,
    pub scroll_budget_exhausted: bool,
    pub final_height: u64,
    pub loaders_timed_out: bool,
    pub masked_nodes: u64,
}

impl SettleReport {
    pub fn degraded(&self) -> bool {
        self.load_timed_out || self.scroll_budget_exhausted || self.loaders_timed_out
    }
}

#[derive(Debug, Default, Deserialize)]
struct ScrollMetrics {
    #[serde(default)]
    height: u64,
    #[serde(default, rename = "atBottom")]
    at_bottom: bool,
}

/// 页面稳定器
///
/// Loading → Scrolling → AwaitingLoaders → Settled，每个状态都有独立的超时，
/// 只有导航本身的错误或脚本执行失败会向上传播
#[derive(Debug, Clone, Default)]
pub struct PageStabilizer {
    config: StabilizerConfig,
}

impl PageStabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    /// 驱动页面直到视觉稳定，返回后页面已回到顶部，可以直接截图
    pub async fn settle(
        &self,
        driver: &dyn PageDriver,
        url: &str,
    ) -> Result<SettleReport, EngineError> {
        let mut report = SettleReport::default();
        let mut state = SettleState::Loading;

        loop {
            tracing::trace!(url, ?state, "Stabilizer state");
            state = match state {
                SettleState::Loading => {
                    self.load(driver, url, &mut report).await?;
                    SettleState::Scrolling
                }
                SettleState::Scrolling => {
                    self.scroll(driver, &mut report).await?;
                    SettleState::AwaitingLoaders
                }
                SettleState::AwaitingLoaders => {
                    self.await_loaders(driver, &mut report).await?;
                    tokio::time::sleep(self.config.settle_delay).await;
                    SettleState::Settled
                }
                SettleState::Settled => {
                    self.freeze_frame(driver, &mut report).await?;
                    break;
                }
            };
        }

        if report.degraded() {
            tracing::warn!(url, ?report, "Page settled with degraded quality");
        }
        Ok(report)
    }

    async fn load(
        &self,
        driver: &dyn PageDriver,
        url: &str,
        report: &mut SettleReport,
    ) -> Result<(), EngineError> {
        match tokio::time::timeout(self.config.load_timeout, driver.navigate(url)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(url, timeout = ?self.config.load_timeout, "Load event did not fire in time");
                report.load_timed_out = true;
            }
        }
        driver.evaluate(FREEZE_ANIMATIONS_SCRIPT).await?;
        Ok(())
    }

    async fn scroll(
        &self,
        driver: &dyn PageDriver,
        report: &mut SettleReport,
    ) -> Result<(), EngineError> {
        let script = SCROLL_STEP_SCRIPT.replace("__STEP__", &self.config.scroll_step_px.to_string());
        let mut last_height = 0u64;
        let mut stable_checks = 0u32;

        for step in 1..=self.config.max_scroll_steps {
            let value = driver.evaluate(&script).await?;
            let metrics: ScrollMetrics = serde_json::from_value(value).unwrap_or_default();
            report.scroll_steps = step;
            report.final_height = metrics.height;

            if metrics.at_bottom && metrics.height == last_height {
                stable_checks += 1;
                if stable_checks >= self.config.stable_height_checks {
                    return Ok(());
                }
            } else {
                stable_checks = 0;
            }
            last_height = metrics.height;
            tokio::time::sleep(self.config.scroll_pause).await;
        }

        report.scroll_budget_exhausted = true;
        Ok(())
    }

    async fn await_loaders(
        &self,
        driver: &dyn PageDriver,
        report: &mut SettleReport,
    ) -> Result<(), EngineError> {
        if self.config.loader_selectors.is_empty() {
            return Ok(());
        }
        let selectors = serde_json::to_string(&self.config.loader_selectors)
            .map_err(|e| EngineError::Other(e.to_string()))?;
        let script = LOADER_VISIBLE_SCRIPT.replace("__SELECTORS__", &selectors);
        let deadline = Instant::now() + self.config.loader_timeout;

        loop {
            let busy = driver.evaluate(&script).await?.as_bool().unwrap_or(false);
            if !busy {
                return Ok(());
            }
            if Instant::now() >= deadline {
                report.loaders_timed_out = true;
                return Ok(());
            }
            tokio::time::sleep(self.config.loader_poll_interval).await;
        }
    }

    async fn freeze_frame(
        &self,
        driver: &dyn PageDriver,
        report: &mut SettleReport,
    ) -> Result<(), EngineError> {
        if self.config.mask_timestamps || !self.config.mask_selectors.is_empty() {
            let selectors = serde_json::to_string(&self.config.mask_selectors)
                .map_err(|e| EngineError::Other(e.to_string()))?;
            let script = MASK_SCRIPT
                .replace("__SELECTORS__", &selectors)
                .replace("__MASK_TIMESTAMPS__", &self.config.mask_timestamps.to_string());
            report.masked_nodes = driver.evaluate(&script).await?.as_u64().unwrap_or(0);
        }
        driver.evaluate(SCROLL_TO_ORIGIN_SCRIPT).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "stabilizer_test.rs"]
mod tests;
