// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 集成测试共享的替身实现
//!
//! 站点由一张路径到 HTML 的表描述，截图引擎生成纯色 PNG，
//! 维护接口按脚本返回结果并记录调用顺序

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use wpvrt::domain::models::capture::{Capture, Phase};
use wpvrt::domain::models::marker::KnownGoodMarker;
use wpvrt::domain::models::run::{RunContext, RunMode, RunOptions};
use wpvrt::domain::models::site::Site;
use wpvrt::domain::services::diff_engine::DiffEngine;
use wpvrt::domain::services::link_discoverer::LinkDiscoverer;
use wpvrt::domain::services::maintenance_service::{
    HealthStatus, MaintenanceService, RollbackResult, UpdateResult,
};
use wpvrt::domain::services::orchestrator::{Orchestrator, OrchestratorConfig};
use wpvrt::domain::services::site_pipeline::{PipelineConfig, SitePipeline};
use wpvrt::engines::traits::{
    CaptureEngine, CaptureRequest, CaptureSession, EngineError, FetchedPage, PageFetcher,
};
use wpvrt::infrastructure::capture_store::CaptureStore;
use wpvrt::infrastructure::repositories::marker_repo_impl::StorageMarkerRepository;
use wpvrt::infrastructure::repositories::report_repo_impl::StorageReportRepository;
use wpvrt::infrastructure::storage::InMemoryStorage;
use wpvrt::utils::retry_policy::RetryPolicy;
use wpvrt::utils::robots::RobotsCheckerTrait;
use wpvrt::workers::concurrency_controller::{ConcurrencyController, ControllerConfig};

pub const IMAGE_WIDTH: u32 = 40;
pub const IMAGE_HEIGHT: u32 = 10;

/// 白底图片，左侧 `changed` 列涂黑；每列占总面积的 2.5%
pub fn page_png(changed: u32) -> Vec<u8> {
    let mut img = RgbaImage::from_pixel(IMAGE_WIDTH, IMAGE_HEIGHT, Rgba([255, 255, 255, 255]));
    for x in 0..changed.min(IMAGE_WIDTH) {
        for y in 0..IMAGE_HEIGHT {
            img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        }
    }
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

pub fn context(mode: RunMode, auto_update: bool, rollback_on_critical: bool) -> RunContext {
    RunContext::new(RunOptions {
        mode,
        auto_update,
        rollback_on_critical,
        ..Default::default()
    })
    .with_run_date(run_date())
}

/// 按路径返回固定 HTML 的站点
#[derive(Default)]
pub struct SiteMap {
    pages: HashMap<String, String>,
    visited: Mutex<Vec<String>>,
}

impl SiteMap {
    /// `pages` 为 (路径, 该页链接到的路径列表)
    pub fn new(pages: &[(&str, Vec<String>)]) -> Self {
        let pages = pages
            .iter()
            .map(|(path, links)| {
                let body: String = links
                    .iter()
                    .map(|link| format!(r#"<a href="{}">{}</a>"#, link, link))
                    .collect();
                (path.to_string(), format!("<html><body>{}</body></html>", body))
            })
            .collect();
        Self {
            pages,
            visited: Mutex::new(Vec::new()),
        }
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().clone()
    }
}

#[async_trait]
impl PageFetcher for SiteMap {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, EngineError> {
        self.visited.lock().push(url.path().to_string());
        match self.pages.get(url.path()) {
            Some(html) => Ok(FetchedPage {
                final_url: url.clone(),
                status_code: 200,
                html: html.clone(),
            }),
            None => Ok(FetchedPage {
                final_url: url.clone(),
                status_code: 404,
                html: String::new(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "site-map"
    }
}

/// 按路径前缀拒绝访问的 robots 策略
#[derive(Default)]
pub struct PathRobots {
    disallowed: Vec<String>,
}

impl PathRobots {
    pub fn disallow(paths: &[&str]) -> Self {
        Self {
            disallowed: paths.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[async_trait]
impl RobotsCheckerTrait for PathRobots {
    async fn is_allowed(&self, url_str: &str, _user_agent: &str) -> anyhow::Result<bool> {
        let url = Url::parse(url_str)?;
        Ok(!self
            .disallowed
            .iter()
            .any(|prefix| url.path().starts_with(prefix.as_str())))
    }
}

/// 生成 PNG 的截图引擎
///
/// 基线阶段总是纯白；对比阶段按页面涂黑指定列数，或直接失败
#[derive(Default)]
pub struct PngCaptureEngine {
    pub after_changes: HashMap<String, u32>,
    pub after_failures: HashSet<String>,
    pub(crate) captured: Arc<Mutex<Vec<(Phase, String)>>>,
}

impl PngCaptureEngine {
    pub fn captured(&self) -> Vec<(Phase, String)> {
        self.captured.lock().clone()
    }
}

struct PngSession {
    after_changes: HashMap<String, u32>,
    after_failures: HashSet<String>,
    captured: Arc<Mutex<Vec<(Phase, String)>>>,
}

#[async_trait]
impl CaptureSession for PngSession {
    async fn capture(&self, request: &CaptureRequest) -> Result<Capture, EngineError> {
        let page_id = request.page.page_id.clone();
        self.captured.lock().push((request.phase, page_id.clone()));

        let changed = match request.phase {
            Phase::Baseline => 0,
            Phase::After => {
                if self.after_failures.contains(&page_id) {
                    return Err(EngineError::Timeout(Duration::from_secs(30)));
                }
                self.after_changes.get(&page_id).copied().unwrap_or(0)
            }
        };
        Ok(Capture::from_image_bytes(
            request.site_id.clone(),
            page_id,
            request.phase,
            page_png(changed),
            Utc::now(),
        ))
    }

    async fn close(&self) {}
}

#[async_trait]
impl CaptureEngine for PngCaptureEngine {
    async fn open_session(
        &self,
        _site_id: &str,
        _pool_size: usize,
    ) -> Result<Arc<dyn CaptureSession>, EngineError> {
        Ok(Arc::new(PngSession {
            after_changes: self.after_changes.clone(),
            after_failures: self.after_failures.clone(),
            captured: self.captured.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "png"
    }
}

/// 维护接口调用记录
#[derive(Debug, Clone, PartialEq)]
pub enum MaintenanceCall {
    Health,
    Checkpoint,
    Update,
    Rollback(String),
}

/// 按脚本返回结果的维护接口
pub struct ScriptedMaintenance {
    pub checkpoint_reference: Option<String>,
    pub rollback_succeeds: bool,
    pub(crate) calls: Mutex<Vec<MaintenanceCall>>,
}

impl Default for ScriptedMaintenance {
    fn default() -> Self {
        Self {
            checkpoint_reference: Some("backup-2025-06-01.sql".to_string()),
            rollback_succeeds: true,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedMaintenance {
    pub fn calls(&self) -> Vec<MaintenanceCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl MaintenanceService for ScriptedMaintenance {
    async fn health_check(&self, _site: &Site) -> anyhow::Result<HealthStatus> {
        self.calls.lock().push(MaintenanceCall::Health);
        Ok(HealthStatus::healthy("HTTP 200 in 12ms"))
    }

    async fn apply_update(&self, _site: &Site) -> anyhow::Result<UpdateResult> {
        self.calls.lock().push(MaintenanceCall::Update);
        Ok(UpdateResult {
            success: true,
            detail: "Success: Updated 2 of 2 plugins.".to_string(),
        })
    }

    async fn rollback(
        &self,
        _site: &Site,
        marker: &KnownGoodMarker,
    ) -> anyhow::Result<RollbackResult> {
        self.calls
            .lock()
            .push(MaintenanceCall::Rollback(marker.reference.clone()));
        Ok(RollbackResult {
            success: self.rollback_succeeds,
            detail: if self.rollback_succeeds {
                "Success: Imported from backup".to_string()
            } else {
                "Error: backup file is corrupt".to_string()
            },
        })
    }

    async fn checkpoint(&self, _site: &Site) -> anyhow::Result<Option<String>> {
        self.calls.lock().push(MaintenanceCall::Checkpoint);
        Ok(self.checkpoint_reference.clone())
    }
}

/// 组装好的完整流水线，所有存储都在内存中
pub struct TestRig {
    pub orchestrator: Orchestrator,
    pub storage: Arc<InMemoryStorage>,
    pub markers: Arc<StorageMarkerRepository>,
    pub reports: Arc<StorageReportRepository>,
    pub fetcher: Arc<SiteMap>,
    pub engine: Arc<PngCaptureEngine>,
    pub maintenance: Arc<ScriptedMaintenance>,
}

pub fn controller(level: &str, max_workers: usize) -> Arc<ConcurrencyController> {
    Arc::new(ConcurrencyController::new(ControllerConfig {
        level: level.to_string(),
        min_workers: 1,
        max_workers,
        initial_workers: max_workers,
        ..Default::default()
    }))
}

pub fn rig(
    fetcher: SiteMap,
    robots: PathRobots,
    engine: PngCaptureEngine,
    maintenance: ScriptedMaintenance,
) -> TestRig {
    let fetcher = Arc::new(fetcher);
    let engine = Arc::new(engine);
    let maintenance = Arc::new(maintenance);
    let storage = Arc::new(InMemoryStorage::new());
    let markers = Arc::new(StorageMarkerRepository::new(storage.clone()));
    let reports = Arc::new(StorageReportRepository::new(storage.clone()));
    let site_controller = controller("site", 2);
    let page_controller = controller("page", 3);

    let discoverer = Arc::new(LinkDiscoverer::new(
        fetcher.clone(),
        Arc::new(robots),
        "wpvrt-test",
    ));
    let pipeline = Arc::new(SitePipeline::new(
        discoverer,
        engine.clone(),
        Arc::new(DiffEngine::default()),
        CaptureStore::new(storage.clone()),
        maintenance.clone(),
        markers.clone(),
        page_controller.clone(),
        PipelineConfig {
            health_retry: RetryPolicy::none(),
            update_retry: RetryPolicy::none(),
            rollback_retry: RetryPolicy::none(),
            checkpoint_retry: RetryPolicy::none(),
            collaborator_timeout: Duration::from_secs(5),
            ..Default::default()
        },
    ));
    let orchestrator = Orchestrator::new(
        pipeline,
        site_controller,
        page_controller,
        OrchestratorConfig {
            inter_wave_delay: Duration::ZERO,
            notify_retry: RetryPolicy::none(),
            ..Default::default()
        },
    )
    .with_reports(reports.clone());

    TestRig {
        orchestrator,
        storage,
        markers,
        reports,
        fetcher,
        engine,
        maintenance,
    }
}

/// 三页小站：首页链接到 about 与 pricing
pub fn three_page_site() -> SiteMap {
    SiteMap::new(&[
        ("/", vec!["/about/".to_string(), "/pricing/".to_string()]),
        ("/about/", vec!["/".to_string()]),
        ("/pricing/", vec![]),
    ])
}

pub fn shop() -> Site {
    Site::new("shop", "https://shop.example.com/")
}
