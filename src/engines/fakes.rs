// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 测试用的页面驱动与上下文工厂

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::capture::Viewport;
use crate::engines::browser_pool::ContextFactory;
use crate::engines::traits::{EngineError, PageDriver};

/// 导航行为
#[derive(Debug, Clone)]
pub enum NavigateBehavior {
    Ok,
    Hang,
    Fail(String),
}

/// 按脚本内容返回预设结果的页面驱动
pub struct ScriptedDriver {
    pub navigate: NavigateBehavior,
    pub heights: Mutex<VecDeque<u64>>,
    pub busy_polls: AtomicUsize,
    pub log: Arc<Mutex<Vec<String>>>,
    pub screenshot_size: (u32, u32),
}

impl ScriptedDriver {
    pub fn new(heights: Vec<u64>) -> Self {
        Self {
            navigate: NavigateBehavior::Ok,
            heights: Mutex::new(heights.into()),
            busy_polls: AtomicUsize::new(0),
            log: Arc::new(Mutex::new(Vec::new())),
            screenshot_size: (4, 3),
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn navigate(&self, url: &str) -> Result<(), EngineError> {
        self.log.lock().push(format!("navigate:{}", url));
        match &self.navigate {
            NavigateBehavior::Ok => Ok(()),
            NavigateBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
            NavigateBehavior::Fail(reason) => Err(EngineError::Navigation {
                url: url.to_string(),
                reason: reason.clone(),
            }),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, EngineError> {
        if script.contains("data-wpvrt") {
            self.log.lock().push("freeze".into());
            return Ok(serde_json::Value::Bool(true));
        }
        if script.contains("scrollBy") {
            self.log.lock().push("scroll".into());
            let mut heights = self.heights.lock();
            let height = if heights.len() > 1 {
                heights.pop_front().unwrap_or(0)
            } else {
                heights.front().copied().unwrap_or(0)
            };
            return Ok(serde_json::json!({ "height": height, "atBottom": heights.len() <= 1 }));
        }
        if script.contains("getComputedStyle") {
            self.log.lock().push("loaders".into());
            let remaining = self.busy_polls.load(Ordering::SeqCst);
            if remaining > 0 {
                self.busy_polls.fetch_sub(1, Ordering::SeqCst);
                return Ok(serde_json::Value::Bool(true));
            }
            return Ok(serde_json::Value::Bool(false));
        }
        if script.contains("createTreeWalker") {
            self.log.lock().push("mask".into());
            return Ok(serde_json::json!(2));
        }
        if script.contains("scrollTo(0, 0)") {
            self.log.lock().push("origin".into());
            return Ok(serde_json::Value::Bool(true));
        }
        Ok(serde_json::Value::Null)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, EngineError> {
        self.log.lock().push("screenshot".into());
        let (w, h) = self.screenshot_size;
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([255, 255, 255, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| EngineError::Other(e.to_string()))?;
        Ok(bytes)
    }

    async fn close(&self) {
        self.log.lock().push("close".into());
    }
}

/// 为每个页面返回 `ScriptedDriver` 的上下文工厂
pub struct FakeContextFactory {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub navigate: NavigateBehavior,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl FakeContextFactory {
    pub fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            navigate: NavigateBehavior::Ok,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ContextFactory for FakeContextFactory {
    type Context = usize;

    async fn create(&self) -> Result<usize, EngineError> {
        Ok(self.created.fetch_add(1, Ordering::SeqCst))
    }

    async fn open_page(
        &self,
        _context: &usize,
        viewport: Viewport,
    ) -> Result<Box<dyn PageDriver>, EngineError> {
        let mut driver = ScriptedDriver::new(vec![1000, 1000]);
        driver.navigate = self.navigate.clone();
        driver.log = self.log.clone();
        driver.screenshot_size = (viewport.width, viewport.height);
        Ok(Box::new(driver))
    }

    async fn destroy(&self, _context: usize) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}
