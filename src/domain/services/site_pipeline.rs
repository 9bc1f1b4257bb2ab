// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use metrics::counter;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::domain::models::capture::{Capture, Phase, Viewport};
use crate::domain::models::comparison::{ComparisonResult, ComparisonStatus};
use crate::domain::models::marker::KnownGoodMarker;
use crate::domain::models::outcome::{
    CaptureRecord, HealthReport, PipelineStage, RollbackOutcome, SiteOutcome, SiteStatus,
    SiteVerdict, UpdateOutcome,
};
use crate::domain::models::page::PageRecord;
use crate::domain::models::run::{RunContext, RunMode};
use crate::domain::models::site::Site;
use crate::domain::repositories::marker_repository::MarkerRepository;
use crate::domain::services::diff_engine::DiffEngine;
use crate::domain::services::link_discoverer::LinkDiscoverer;
use crate::domain::services::maintenance_service::MaintenanceService;
use crate::engines::traits::{CaptureEngine, CaptureRequest, CaptureSession};
use crate::infrastructure::capture_store::CaptureStore;
use crate::utils::errors::VrtError;
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::concurrency_controller::ConcurrencyController;
use crate::workers::wave_runner::WaveRunner;

/// 站点流水线配置
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 默认差异阈值（百分比）
    pub threshold: f64,
    /// 默认严重差异阈值（百分比）
    pub critical_threshold: f64,
    pub default_viewport: Viewport,
    /// 单次外部协作方调用的超时
    pub collaborator_timeout: Duration,
    pub health_retry: RetryPolicy,
    pub update_retry: RetryPolicy,
    pub rollback_retry: RetryPolicy,
    pub checkpoint_retry: RetryPolicy,
    /// 页面批次之间的停顿
    pub page_wave_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            critical_threshold: 10.0,
            default_viewport: Viewport::default(),
            collaborator_timeout: Duration::from_secs(600),
            health_retry: RetryPolicy::fast(),
            update_retry: RetryPolicy::none(),
            rollback_retry: RetryPolicy::fast(),
            checkpoint_retry: RetryPolicy::fast(),
            page_wave_delay: Duration::ZERO,
        }
    }
}

/// 终止站点运行的阶段错误
#[derive(Debug)]
struct StageFailure {
    stage: PipelineStage,
    error: VrtError,
}

impl StageFailure {
    fn new(stage: PipelineStage, error: VrtError) -> Self {
        Self { stage, error }
    }
}

/// 站点流水线（回滚状态机）
///
/// 按运行模式线性推进：
///
/// - `baseline`：HealthCheck → Discover → CaptureBaseline → Checkpoint
/// - `after`：HealthCheck → Discover → CaptureAfter
/// - `compare`：Discover → Compare → [Rollback → PostRollbackHealthCheck]
/// - `full`：HealthCheck → Discover → CaptureBaseline → Checkpoint →
///   [ApplyUpdate → PostUpdateHealthCheck] → CaptureAfter → Compare →
///   [Rollback → PostRollbackHealthCheck]
///
/// 任一阶段失败即终止该站点，并记录失败阶段。页面级错误只进入对应的记录，不终止站点
pub struct SitePipeline {
    discoverer: Arc<LinkDiscoverer>,
    capture_engine: Arc<dyn CaptureEngine>,
    diff_engine: Arc<DiffEngine>,
    store: CaptureStore,
    maintenance: Arc<dyn MaintenanceService>,
    markers: Arc<dyn MarkerRepository>,
    page_controller: Arc<ConcurrencyController>,
    config: PipelineConfig,
}

/// 单站点执行的抽象，编排器只依赖该特质
#[async_trait]
pub trait SiteRunner: Send + Sync {
    /// 执行站点并返回终态结果，不返回错误
    async fn run_site(&self, site: &Site, ctx: &RunContext) -> SiteOutcome;
}

#[async_trait]
impl SiteRunner for SitePipeline {
    async fn run_site(&self, site: &Site, ctx: &RunContext) -> SiteOutcome {
        self.run(site, ctx).await
    }
}

impl SitePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        discoverer: Arc<LinkDiscoverer>,
        capture_engine: Arc<dyn CaptureEngine>,
        diff_engine: Arc<DiffEngine>,
        store: CaptureStore,
        maintenance: Arc<dyn MaintenanceService>,
        markers: Arc<dyn MarkerRepository>,
        page_controller: Arc<ConcurrencyController>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            discoverer,
            capture_engine,
            diff_engine,
            store,
            maintenance,
            markers,
            page_controller,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn page_controller(&self) -> &Arc<ConcurrencyController> {
        &self.page_controller
    }

    /// 执行单个站点，总是返回一个终态结果
    #[instrument(skip_all, fields(site_id = %site.id, batch_id = %ctx.batch_id, mode = %ctx.options.mode))]
    pub async fn run(&self, site: &Site, ctx: &RunContext) -> SiteOutcome {
        let mut outcome = SiteOutcome::new(&site.id);
        let result = match site.validate() {
            Ok(root) => self.execute(site, &root, ctx, &mut outcome).await,
            Err(e) => {
                outcome.stages.push(PipelineStage::Pending);
                Err(StageFailure::new(PipelineStage::Pending, e))
            }
        };
        finish(outcome, result)
    }

    async fn execute(
        &self,
        site: &Site,
        root: &Url,
        ctx: &RunContext,
        outcome: &mut SiteOutcome,
    ) -> Result<(), StageFailure> {
        let mode = ctx.options.mode;
        if mode != RunMode::Compare {
            self.health_gate(site, PipelineStage::HealthCheck, outcome)
                .await?;
        }

        self.discover(site, root, outcome).await;

        match mode {
            RunMode::Baseline => {
                self.capture_phase(site, ctx, Phase::Baseline, outcome)
                    .await?;
                self.checkpoint(site, outcome).await;
            }
            RunMode::After => {
                self.capture_phase(site, ctx, Phase::After, outcome).await?;
            }
            RunMode::Compare => {
                self.compare_and_recover(site, ctx, outcome).await?;
            }
            RunMode::Full => {
                self.capture_phase(site, ctx, Phase::Baseline, outcome)
                    .await?;
                self.checkpoint(site, outcome).await;
                if ctx.options.auto_update {
                    self.apply_update(site, outcome).await?;
                    self.health_gate(site, PipelineStage::PostUpdateHealthCheck, outcome)
                        .await?;
                }
                self.capture_phase(site, ctx, Phase::After, outcome).await?;
                self.compare_and_recover(site, ctx, outcome).await?;
            }
        }
        Ok(())
    }

    async fn compare_and_recover(
        &self,
        site: &Site,
        ctx: &RunContext,
        outcome: &mut SiteOutcome,
    ) -> Result<(), StageFailure> {
        self.compare(site, ctx, outcome).await;

        if outcome.critical_regression && ctx.options.rollback_on_critical {
            let rollback = self.rollback(site, outcome).await;
            // the site state is unknown after any rollback attempt, always probe it
            let health = self
                .health_gate(site, PipelineStage::PostRollbackHealthCheck, outcome)
                .await;
            rollback?;
            health?;
        } else if !outcome.critical_regression
            && !outcome.comparisons.is_empty()
            && outcome
                .comparisons
                .iter()
                .all(|c| c.status == ComparisonStatus::Ok)
        {
            self.verify_marker(site).await;
        }
        Ok(())
    }

    /// 带超时与重试的协作方调用
    async fn call<T, F, Fut>(
        &self,
        operation: &str,
        policy: &RetryPolicy,
        mut f: F,
    ) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let timeout = self.config.collaborator_timeout;
        policy
            .run(operation, |_| {
                let call = f();
                async move {
                    match tokio::time::timeout(timeout, call).await {
                        Ok(result) => result,
                        Err(_) => Err(anyhow!("timed out after {:?}", timeout)),
                    }
                }
            })
            .await
    }

    async fn health_gate(
        &self,
        site: &Site,
        stage: PipelineStage,
        outcome: &mut SiteOutcome,
    ) -> Result<(), StageFailure> {
        enter(outcome, stage);
        let result = self
            .call("health_check", &self.config.health_retry, || {
                self.maintenance.health_check(site)
            })
            .await;

        let (healthy, detail) = match result {
            Ok(status) => (status.healthy, status.detail),
            Err(e) => (false, e.to_string()),
        };
        outcome.health_checks.push(HealthReport {
            stage,
            healthy,
            detail: detail.clone(),
            checked_at: Utc::now(),
        });

        if healthy {
            debug!(stage = %stage, %detail, "Site healthy");
            Ok(())
        } else {
            warn!(stage = %stage, %detail, "Site health check failed");
            Err(StageFailure::new(stage, VrtError::HealthCheckFailed(detail)))
        }
    }

    async fn discover(&self, site: &Site, root: &Url, outcome: &mut SiteOutcome) {
        enter(outcome, PipelineStage::Discover);
        let discovered = self.discoverer.discover(root, site.limits).await;

        // distinct paths can collapse onto one page id, keep the first
        let mut seen = HashSet::new();
        let pages: Vec<PageRecord> = discovered
            .into_iter()
            .filter(|p| seen.insert(p.page_id.clone()))
            .collect();

        info!(
            pages = pages.len(),
            failed = pages.iter().filter(|p| p.load_error.is_some()).count(),
            "Discovery finished"
        );
        outcome.pages = pages;
    }

    async fn capture_phase(
        &self,
        site: &Site,
        ctx: &RunContext,
        phase: Phase,
        outcome: &mut SiteOutcome,
    ) -> Result<(), StageFailure> {
        let stage = match phase {
            Phase::Baseline => PipelineStage::CaptureBaseline,
            Phase::After => PipelineStage::CaptureAfter,
        };
        enter(outcome, stage);

        let date = match phase {
            Phase::Baseline => ctx.baseline_date(),
            Phase::After => ctx.after_date(),
        };
        let viewport = site.viewport.unwrap_or(self.config.default_viewport);
        let pool_size = self.page_controller.config().max_workers;

        let session = self
            .capture_engine
            .open_session(&site.id, pool_size)
            .await
            .map_err(|e| StageFailure::new(stage, e.into()))?;

        let pages = outcome.pages.clone();
        let runner = self.page_runner(ctx);
        let mut report = runner
            .run(
                pages.clone(),
                |p| p.page_id.clone(),
                |page| {
                    let session = session.clone();
                    async move {
                        self.capture_page(session.as_ref(), site, phase, date, viewport, page)
                            .await
                    }
                },
            )
            .await;
        session.close().await;

        let records: Vec<CaptureRecord> = pages
            .iter()
            .map(|page| match report.results.remove(&page.page_id) {
                Some(Ok(record)) => record,
                Some(Err(panicked)) => {
                    CaptureRecord::failed(page, phase, &VrtError::Internal(panicked.to_string()))
                }
                None => CaptureRecord::failed(
                    page,
                    phase,
                    &VrtError::ResourceExhausted("emergency stop before capture".into()),
                ),
            })
            .collect();

        let failed = records.iter().filter(|r| !r.is_success()).count();
        info!(phase = %phase, total = records.len(), failed, "Capture phase finished");
        outcome.captures.extend(records);
        Ok(())
    }

    #[instrument(skip_all, fields(page_id = %page.page_id, phase = %phase))]
    async fn capture_page(
        &self,
        session: &dyn CaptureSession,
        site: &Site,
        phase: Phase,
        date: NaiveDate,
        viewport: Viewport,
        page: PageRecord,
    ) -> CaptureRecord {
        if let Some(load_error) = &page.load_error {
            counter!("vrt_captures_total", "phase" => phase.as_str(), "result" => "skipped")
                .increment(1);
            return CaptureRecord::failed(
                &page,
                phase,
                &VrtError::NavigationError {
                    url: page.url.clone(),
                    reason: load_error.clone(),
                },
            );
        }

        let request = CaptureRequest {
            site_id: site.id.clone(),
            page: page.clone(),
            phase,
            viewport,
        };

        let stored = match session.capture(&request).await {
            Ok(capture) => self
                .store
                .save_capture(&capture, date, Some(&page.url))
                .await
                .map(|key| (key, capture.width, capture.height)),
            Err(e) => Err(VrtError::from(e)),
        };

        match stored {
            Ok((key, width, height)) => {
                counter!("vrt_captures_total", "phase" => phase.as_str(), "result" => "success")
                    .increment(1);
                CaptureRecord {
                    page_id: page.page_id,
                    url: page.url,
                    phase,
                    storage_key: Some(key),
                    width,
                    height,
                    error_kind: None,
                    error: None,
                }
            }
            Err(e) => {
                counter!("vrt_captures_total", "phase" => phase.as_str(), "result" => "failure")
                    .increment(1);
                warn!(page_id = %page.page_id, error = %e, "Capture failed");
                CaptureRecord::failed(&page, phase, &e)
            }
        }
    }

    /// 对比阶段
    ///
    /// 本次运行截取过的阶段只认本次的截图记录，失败的截图按缺失处理；
    /// 本次未截取的阶段（`compare` 模式）读取存储，页面集合并入已存储截图
    async fn compare(&self, site: &Site, ctx: &RunContext, outcome: &mut SiteOutcome) {
        enter(outcome, PipelineStage::Compare);

        let threshold = site.threshold.unwrap_or(self.config.threshold);
        let critical = site
            .critical_threshold
            .unwrap_or(self.config.critical_threshold);
        let baseline_date = ctx.baseline_date();
        let after_date = ctx.after_date();

        let baseline_run = captured_this_run(outcome, Phase::Baseline);
        let after_run = captured_this_run(outcome, Phase::After);

        let mut page_ids: Vec<String> = outcome.pages.iter().map(|p| p.page_id.clone()).collect();
        let mut known: HashSet<String> = page_ids.iter().cloned().collect();
        for (phase, date, run) in [
            (Phase::Baseline, baseline_date, &baseline_run),
            (Phase::After, after_date, &after_run),
        ] {
            if run.is_some() {
                continue;
            }
            match self.store.list_pages(phase, date, &site.id).await {
                Ok(stored) => {
                    for id in stored {
                        if known.insert(id.clone()) {
                            page_ids.push(id);
                        }
                    }
                }
                Err(e) => warn!(phase = %phase, error = %e, "Failed to list stored captures"),
            }
        }

        let targets: Vec<CompareTarget> = page_ids
            .iter()
            .map(|id| CompareTarget {
                page_id: id.clone(),
                baseline: usable_capture(&baseline_run, id),
                after: usable_capture(&after_run, id),
            })
            .collect();

        let runner = self.page_runner(ctx);
        let mut report = runner
            .run(
                targets,
                |t| t.page_id.clone(),
                |target| async move {
                    self.compare_page(&site.id, target, baseline_date, after_date, threshold, ctx.run_date)
                        .await
                },
            )
            .await;

        let results: Vec<ComparisonResult> = page_ids
            .iter()
            .map(|id| match report.results.remove(id) {
                Some(Ok(result)) => result,
                Some(Err(panicked)) => ComparisonResult::from_error(
                    id.as_str(),
                    threshold,
                    &VrtError::Internal(panicked.to_string()),
                ),
                None => ComparisonResult::from_error(
                    id.as_str(),
                    threshold,
                    &VrtError::ResourceExhausted("emergency stop before comparison".into()),
                ),
            })
            .collect();

        outcome.critical_regression = results
            .iter()
            .any(|r| r.diff_percentage.is_some_and(|pct| pct > critical));
        outcome.verdict = Some(if results.iter().any(|r| r.status == ComparisonStatus::Ng) {
            SiteVerdict::Ng
        } else {
            SiteVerdict::Ok
        });
        outcome.comparisons = results;

        info!(
            pages = outcome.comparisons.len(),
            ng = outcome.count_pages(ComparisonStatus::Ng),
            missing = outcome.count_pages(ComparisonStatus::MissingAfter),
            critical = outcome.critical_regression,
            "Comparison finished"
        );
    }

    async fn compare_page(
        &self,
        site_id: &str,
        target: CompareTarget,
        baseline_date: NaiveDate,
        after_date: NaiveDate,
        threshold: f64,
        diff_date: NaiveDate,
    ) -> ComparisonResult {
        let page_id = target.page_id;
        let baseline = self
            .load_if(target.baseline, site_id, &page_id, Phase::Baseline, baseline_date)
            .await;
        let after = self
            .load_if(target.after, site_id, &page_id, Phase::After, after_date)
            .await;
        let (baseline, after) = match (baseline, after) {
            (Ok(b), Ok(a)) => (b, a),
            (Err(e), _) | (_, Err(e)) => {
                return ComparisonResult::from_error(page_id, threshold, &e);
            }
        };

        let engine = self.diff_engine.clone();
        let id = page_id.clone();
        let mut result = match tokio::task::spawn_blocking(move || {
            engine.compare(&id, baseline.as_ref(), after.as_ref(), threshold)
        })
        .await
        {
            Ok(result) => result,
            Err(e) => ComparisonResult::from_error(
                page_id.as_str(),
                threshold,
                &VrtError::Internal(format!("diff task failed: {}", e)),
            ),
        };

        if let Some(image) = result.diff_image.take() {
            match self
                .store
                .save_diff(diff_date, site_id, threshold, &result.page_id, &image)
                .await
            {
                Ok(key) => result.diff_image_key = Some(key),
                Err(e) => warn!(page_id = %result.page_id, error = %e, "Failed to store diff image"),
            }
        }

        counter!("vrt_comparisons_total", "status" => result.status.to_string()).increment(1);
        result
    }

    async fn load_if(
        &self,
        usable: bool,
        site_id: &str,
        page_id: &str,
        phase: Phase,
        date: NaiveDate,
    ) -> Result<Option<Capture>, VrtError> {
        if !usable {
            return Ok(None);
        }
        self.store.load_capture(site_id, page_id, phase, date).await
    }

    async fn checkpoint(&self, site: &Site, outcome: &mut SiteOutcome) {
        enter(outcome, PipelineStage::Checkpoint);
        let result = self
            .call("checkpoint", &self.config.checkpoint_retry, || {
                self.maintenance.checkpoint(site)
            })
            .await;

        match result {
            Ok(Some(reference)) => {
                let mut marker = KnownGoodMarker::new(&site.id, reference);
                marker.verified_at = Some(Utc::now());
                match self.markers.record(&marker).await {
                    Ok(()) => info!(reference = %marker.reference, "Known-good checkpoint recorded"),
                    Err(e) => warn!(error = %e, "Failed to record checkpoint marker"),
                }
            }
            Ok(None) => debug!("No checkpoint support for site"),
            // a failed checkpoint keeps the previous marker as rollback target
            Err(e) => warn!(error = %e, "Checkpoint failed"),
        }
    }

    async fn apply_update(
        &self,
        site: &Site,
        outcome: &mut SiteOutcome,
    ) -> Result<(), StageFailure> {
        enter(outcome, PipelineStage::ApplyUpdate);
        let result = self
            .call("apply_update", &self.config.update_retry, || {
                self.maintenance.apply_update(site)
            })
            .await;

        let update = match result {
            Ok(update) => UpdateOutcome {
                success: update.success,
                detail: update.detail,
            },
            Err(e) => UpdateOutcome {
                success: false,
                detail: e.to_string(),
            },
        };
        let success = update.success;
        let detail = update.detail.clone();
        outcome.update = Some(update);

        if success {
            info!("Update applied");
            Ok(())
        } else {
            warn!(%detail, "Update failed");
            Err(StageFailure::new(
                PipelineStage::ApplyUpdate,
                VrtError::UpdateFailed(detail),
            ))
        }
    }

    async fn rollback(&self, site: &Site, outcome: &mut SiteOutcome) -> Result<(), StageFailure> {
        enter(outcome, PipelineStage::Rollback);

        let marker = match self.markers.latest(&site.id).await {
            Ok(Some(marker)) => marker,
            Ok(None) => {
                return Err(self.rollback_failed(outcome, None, false, "no known-good marker recorded"));
            }
            Err(e) => {
                let detail = format!("failed to read known-good marker: {}", e);
                return Err(self.rollback_failed(outcome, None, false, &detail));
            }
        };

        info!(reference = %marker.reference, "Rolling back to known-good marker");
        let result = self
            .call("rollback", &self.config.rollback_retry, || {
                self.maintenance.rollback(site, &marker)
            })
            .await;

        match result {
            Ok(rollback) if rollback.success => {
                counter!("vrt_rollbacks_total", "result" => "success").increment(1);
                outcome.rollback = Some(RollbackOutcome {
                    marker: Some(marker),
                    executed: true,
                    success: true,
                    detail: rollback.detail,
                });
                Ok(())
            }
            Ok(rollback) => Err(self.rollback_failed(outcome, Some(marker), true, &rollback.detail)),
            Err(e) => Err(self.rollback_failed(outcome, Some(marker), true, &e.to_string())),
        }
    }

    fn rollback_failed(
        &self,
        outcome: &mut SiteOutcome,
        marker: Option<KnownGoodMarker>,
        executed: bool,
        detail: &str,
    ) -> StageFailure {
        let result = if marker.is_some() { "failure" } else { "no_marker" };
        counter!("vrt_rollbacks_total", "result" => result).increment(1);
        warn!(%detail, "Rollback failed");
        outcome.rollback = Some(RollbackOutcome {
            marker,
            executed,
            success: false,
            detail: detail.to_string(),
        });
        StageFailure::new(
            PipelineStage::Rollback,
            VrtError::RollbackFailed(detail.to_string()),
        )
    }

    /// 无差异运行结束后刷新标记的确认时间
    async fn verify_marker(&self, site: &Site) {
        match self.markers.latest(&site.id).await {
            Ok(Some(mut marker)) => {
                marker.verified_at = Some(Utc::now());
                if let Err(e) = self.markers.record(&marker).await {
                    warn!(error = %e, "Failed to refresh known-good marker");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read known-good marker"),
        }
    }

    fn page_runner(&self, ctx: &RunContext) -> WaveRunner {
        WaveRunner::new(
            "pages",
            self.page_controller.clone(),
            self.page_controller.clone(),
        )
        .with_cap(ctx.options.page_concurrency)
        .with_inter_wave_delay(self.config.page_wave_delay)
    }
}

/// 一个待对比页面，标记两侧截图是否可以从存储读取
struct CompareTarget {
    page_id: String,
    baseline: bool,
    after: bool,
}

/// 本次运行在该阶段截取的页面及其成败；该阶段未截取时为 `None`
fn captured_this_run(outcome: &SiteOutcome, phase: Phase) -> Option<HashMap<String, bool>> {
    let records: HashMap<String, bool> = outcome
        .captures
        .iter()
        .filter(|c| c.phase == phase)
        .map(|c| (c.page_id.clone(), c.is_success()))
        .collect();
    outcome
        .stages
        .contains(&match phase {
            Phase::Baseline => PipelineStage::CaptureBaseline,
            Phase::After => PipelineStage::CaptureAfter,
        })
        .then_some(records)
}

// a page this run did not capture successfully must not fall back to an older file
fn usable_capture(run: &Option<HashMap<String, bool>>, page_id: &str) -> bool {
    match run {
        Some(records) => records.get(page_id).copied().unwrap_or(false),
        None => true,
    }
}

fn enter(outcome: &mut SiteOutcome, stage: PipelineStage) {
    debug!(stage = %stage, "Entering stage");
    outcome.stages.push(stage);
}

fn finish(mut outcome: SiteOutcome, result: Result<(), StageFailure>) -> SiteOutcome {
    match result {
        Ok(()) => {
            outcome.status = SiteStatus::Done;
            outcome.stages.push(PipelineStage::Done);
        }
        Err(failure) => {
            warn!(
                stage = %failure.stage,
                error_kind = failure.error.kind(),
                error = %failure.error,
                "Site run failed"
            );
            outcome.status = SiteStatus::Failed;
            outcome.failed_stage = Some(failure.stage);
            outcome.error_kind = Some(failure.error.kind().to_string());
            outcome.error = Some(failure.error.to_string());
            outcome.stages.push(PipelineStage::Failed);
        }
    }
    outcome.finished_at = Utc::now();

    let status = match outcome.status {
        SiteStatus::Done => "done",
        SiteStatus::Failed => "failed",
    };
    counter!("vrt_sites_total", "status" => status).increment(1);
    info!(
        status,
        verdict = ?outcome.verdict,
        critical = outcome.critical_regression,
        "Site run finished"
    );
    outcome
}

#[cfg(test)]
#[path = "site_pipeline_test.rs"]
mod tests;
