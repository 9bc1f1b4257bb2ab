// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::domain::models::outcome::{BatchSummary, SiteOutcome};
use crate::domain::models::run::RunContext;
use crate::domain::models::site::Site;
use crate::domain::repositories::report_repository::ReportRepository;
use crate::domain::services::notifier::{Notifier, NotifyPolicy};
use crate::domain::services::site_pipeline::SiteRunner;
use crate::utils::errors::VrtError;
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::concurrency_controller::ConcurrencyController;
use crate::workers::wave_runner::WaveRunner;

/// 编排器配置
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 站点批次之间的固定停顿
    pub inter_wave_delay: Duration,
    pub notify_policy: NotifyPolicy,
    pub notify_retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            inter_wave_delay: Duration::from_secs(2),
            notify_policy: NotifyPolicy::OnIssues,
            notify_retry: RetryPolicy::fast(),
        }
    }
}

/// 批次编排器
///
/// 按站点级预算把站点分批执行，单个站点的失败（包括 panic）只影响该站点的结果。
/// 每个输入站点恰好产生一个结果，顺序与输入一致
pub struct Orchestrator {
    runner: Arc<dyn SiteRunner>,
    site_controller: Arc<ConcurrencyController>,
    page_controller: Arc<ConcurrencyController>,
    reports: Option<Arc<dyn ReportRepository>>,
    notifier: Option<Arc<dyn Notifier>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn SiteRunner>,
        site_controller: Arc<ConcurrencyController>,
        page_controller: Arc<ConcurrencyController>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            runner,
            site_controller,
            page_controller,
            reports: None,
            notifier: None,
            config,
        }
    }

    pub fn with_reports(mut self, reports: Arc<dyn ReportRepository>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn site_controller(&self) -> &Arc<ConcurrencyController> {
        &self.site_controller
    }

    pub fn page_controller(&self) -> &Arc<ConcurrencyController> {
        &self.page_controller
    }

    /// 执行一个批次，总是返回汇总
    #[instrument(skip_all, fields(batch_id = %ctx.batch_id, mode = %ctx.options.mode, sites = sites.len()))]
    pub async fn run_batch(&self, sites: Vec<Site>, ctx: &RunContext) -> BatchSummary {
        let started_at = Utc::now();
        let timer = Instant::now();

        // the stop flag only lives for one batch
        self.site_controller.reset_emergency();
        self.page_controller.reset_emergency();

        info!("Batch started");

        let runner = WaveRunner::new(
            "sites",
            self.site_controller.clone(),
            self.site_controller.clone(),
        )
        .with_cap(ctx.options.site_concurrency)
        .with_inter_wave_delay(self.config.inter_wave_delay);

        // keyed by position so duplicate ids still map to their own outcome
        let indexed: Vec<(usize, Site)> = sites.into_iter().enumerate().collect();
        let ids: Vec<String> = indexed.iter().map(|(_, s)| s.id.clone()).collect();
        let mut report = runner
            .run(
                indexed,
                |(index, _)| *index,
                |(_, site)| async move { self.runner.run_site(&site, ctx).await },
            )
            .await;

        let outcomes: Vec<SiteOutcome> = ids
            .iter()
            .enumerate()
            .map(|(index, site_id)| match report.results.remove(&index) {
                Some(Ok(outcome)) => outcome,
                Some(Err(panicked)) => {
                    counter!("vrt_sites_total", "status" => "failed").increment(1);
                    SiteOutcome::failed_before_start(
                        site_id.as_str(),
                        &VrtError::Internal(panicked.to_string()),
                    )
                }
                None => {
                    counter!("vrt_sites_total", "status" => "failed").increment(1);
                    SiteOutcome::failed_before_start(
                        site_id.as_str(),
                        &VrtError::ResourceExhausted(
                            "emergency stop raised before the site started".into(),
                        ),
                    )
                }
            })
            .collect();

        let emergency_stopped = report.stopped
            || self.site_controller.is_emergency()
            || self.page_controller.is_emergency();

        let summary = BatchSummary::from_outcomes(
            ctx.batch_id.as_str(),
            ctx.run_date,
            ctx.options.mode,
            emergency_stopped,
            started_at,
            outcomes,
        );

        histogram!("vrt_batch_duration_seconds").record(timer.elapsed().as_secs_f64());
        info!(
            total = summary.total_sites,
            success = summary.success_count,
            failure = summary.failure_count,
            ng = summary.ng_count,
            critical = summary.critical_count,
            rollbacks = summary.rollback_count,
            emergency_stopped,
            waves = report.waves,
            "Batch finished"
        );

        self.persist(&summary).await;
        self.notify(&summary).await;
        summary
    }

    /// 持久化结果；失败只记录日志
    async fn persist(&self, summary: &BatchSummary) {
        let Some(reports) = &self.reports else {
            return;
        };

        for outcome in &summary.outcomes {
            if let Err(e) = reports
                .save_outcome(summary.run_date, &summary.batch_id, outcome)
                .await
            {
                warn!(site_id = %outcome.site_id, error = %e, "Failed to persist site outcome");
            }
        }
        if let Err(e) = reports.save_summary(summary).await {
            warn!(error = %e, "Failed to persist batch summary");
        }
    }

    /// 按通知策略发送汇总；失败只记录日志
    async fn notify(&self, summary: &BatchSummary) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if !self.config.notify_policy.should_notify(summary) {
            return;
        }

        let result = self
            .config
            .notify_retry
            .run("notify", |_| notifier.notify(summary))
            .await;
        if let Err(e) = result {
            warn!(error = %e, "Failed to deliver batch notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::outcome::{PipelineStage, SiteStatus, SiteVerdict};
    use crate::domain::models::resource::ResourceSnapshot;
    use crate::domain::models::run::{RunMode, RunOptions};
    use crate::domain::repositories::report_repository::ReportRepository;
    use crate::infrastructure::repositories::report_repo_impl::StorageReportRepository;
    use crate::infrastructure::storage::InMemoryStorage;
    use crate::workers::concurrency_controller::ControllerConfig;
    use async_trait::async_trait;
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        pub Notifier {}
        #[async_trait]
        impl Notifier for Notifier {
            async fn notify(&self, summary: &BatchSummary) -> anyhow::Result<()>;
        }
    }

    /// 按站点标识决定行为的执行器
    struct ScriptedRunner {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        /// 站点执行期间触发紧急停止
        stop_on: Option<(String, Arc<ConcurrencyController>)>,
    }

    impl ScriptedRunner {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                stop_on: None,
            }
        }
    }

    #[async_trait]
    impl SiteRunner for ScriptedRunner {
        async fn run_site(&self, site: &Site, _ctx: &RunContext) -> SiteOutcome {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some((id, controller)) = &self.stop_on {
                if id == &site.id {
                    controller.check_emergency(&ResourceSnapshot::new(99.0, 40.0, 0));
                }
            }
            if site.id == "panics" {
                panic!("renderer crashed");
            }

            let mut outcome = SiteOutcome::new(&site.id);
            outcome.stages = vec![PipelineStage::Compare, PipelineStage::Done];
            outcome.verdict = Some(if site.id.starts_with("ng") {
                SiteVerdict::Ng
            } else {
                SiteVerdict::Ok
            });
            outcome
        }
    }

    fn controller(level: &str, budget: usize) -> Arc<ConcurrencyController> {
        Arc::new(ConcurrencyController::new(ControllerConfig {
            level: level.into(),
            min_workers: 1,
            max_workers: budget,
            initial_workers: budget,
            ..Default::default()
        }))
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            inter_wave_delay: Duration::ZERO,
            notify_policy: NotifyPolicy::OnIssues,
            notify_retry: RetryPolicy::none(),
        }
    }

    fn sites(ids: &[&str]) -> Vec<Site> {
        ids.iter()
            .map(|id| Site::new(*id, format!("https://{}.example.com/", id)))
            .collect()
    }

    fn ctx() -> RunContext {
        RunContext::new(RunOptions {
            mode: RunMode::Compare,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_every_site_yields_exactly_one_outcome_in_order() {
        let runner = Arc::new(ScriptedRunner::new());
        let orchestrator = Orchestrator::new(
            runner.clone(),
            controller("site", 2),
            controller("page", 2),
            config(),
        );

        let summary = orchestrator
            .run_batch(sites(&["a", "panics", "ng-b", "c", "a"]), &ctx())
            .await;

        assert_eq!(summary.total_sites, 5);
        let ids: Vec<&str> = summary.outcomes.iter().map(|o| o.site_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "panics", "ng-b", "c", "a"]);
        assert_eq!(summary.failure_count, 1);
        assert_eq!(summary.success_count, 4);
        assert_eq!(summary.ng_count, 1);
        assert_eq!(summary.outcomes[1].status, SiteStatus::Failed);
        assert_eq!(summary.outcomes[1].error_kind.as_deref(), Some("internal_error"));
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
        assert!(!summary.emergency_stopped);
    }

    #[tokio::test]
    async fn test_site_concurrency_override_caps_waves() {
        let runner = Arc::new(ScriptedRunner::new());
        let orchestrator = Orchestrator::new(
            runner.clone(),
            controller("site", 4),
            controller("page", 2),
            config(),
        );
        let ctx = RunContext::new(RunOptions {
            mode: RunMode::Compare,
            site_concurrency: Some(1),
            ..Default::default()
        });

        orchestrator.run_batch(sites(&["a", "b", "c"]), &ctx).await;
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_emergency_stop_skips_later_waves_and_resets_next_batch() {
        let site_controller = controller("site", 1);
        let mut runner = ScriptedRunner::new();
        runner.stop_on = Some(("a".to_string(), site_controller.clone()));
        let orchestrator = Orchestrator::new(
            Arc::new(runner),
            site_controller.clone(),
            controller("page", 1),
            config(),
        );

        let summary = orchestrator.run_batch(sites(&["a", "b", "c"]), &ctx()).await;

        assert!(summary.emergency_stopped);
        assert_eq!(summary.outcomes[0].status, SiteStatus::Done);
        for skipped in &summary.outcomes[1..] {
            assert_eq!(skipped.status, SiteStatus::Failed);
            assert_eq!(skipped.failed_stage, Some(PipelineStage::Pending));
            assert_eq!(skipped.error_kind.as_deref(), Some("resource_exhausted"));
        }

        let next = orchestrator.run_batch(sites(&["b"]), &ctx()).await;
        assert!(!next.emergency_stopped);
        assert_eq!(next.success_count, 1);
    }

    #[tokio::test]
    async fn test_reports_are_persisted_and_notification_failure_is_ignored() {
        let storage = Arc::new(InMemoryStorage::new());
        let reports = Arc::new(StorageReportRepository::new(storage.clone()));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("webhook returned 503")));

        let orchestrator = Orchestrator::new(
            Arc::new(ScriptedRunner::new()),
            controller("site", 2),
            controller("page", 2),
            config(),
        )
        .with_reports(reports.clone())
        .with_notifier(Arc::new(notifier));

        let ctx = ctx();
        let summary = orchestrator.run_batch(sites(&["ng-a", "b"]), &ctx).await;
        assert_eq!(summary.total_sites, 2);

        let stored = reports
            .find_summary(ctx.run_date, &ctx.batch_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.ng_count, 1);
        assert_eq!(stored.outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_clean_batch_skips_on_issues_notification() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);

        let orchestrator = Orchestrator::new(
            Arc::new(ScriptedRunner::new()),
            controller("site", 2),
            controller("page", 2),
            config(),
        )
        .with_notifier(Arc::new(notifier));

        let summary = orchestrator.run_batch(sites(&["a", "b"]), &ctx()).await;
        assert!(!summary.has_issues());
    }
}
