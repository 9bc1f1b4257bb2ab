// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use wpvrt::application::use_cases::run_batch_use_case::RunBatchUseCase;
use wpvrt::config::settings::{FetcherKind, Settings};
use wpvrt::domain::repositories::site_repository::SiteRepository;
use wpvrt::domain::services::diff_engine::DiffEngine;
use wpvrt::domain::services::link_discoverer::LinkDiscoverer;
use wpvrt::domain::services::notifier::Notifier;
use wpvrt::domain::services::orchestrator::Orchestrator;
use wpvrt::domain::services::site_pipeline::SitePipeline;
use wpvrt::engines::chromium_engine::ChromiumEngine;
use wpvrt::engines::http_fetcher::HttpPageFetcher;
use wpvrt::engines::traits::PageFetcher;
use wpvrt::infrastructure::capture_store::CaptureStore;
use wpvrt::infrastructure::observability::{metrics, system_probe::SystemProbe};
use wpvrt::infrastructure::repositories::marker_repo_impl::StorageMarkerRepository;
use wpvrt::infrastructure::repositories::report_repo_impl::StorageReportRepository;
use wpvrt::infrastructure::repositories::site_repo_impl::StaticSiteRepository;
use wpvrt::infrastructure::services::maintenance_impl::SiteMaintenance;
use wpvrt::infrastructure::services::webhook_notifier::{LogNotifier, WebhookNotifier};
use wpvrt::infrastructure::storage::create_storage_repository;
use wpvrt::presentation::handlers::resource_handler::Controllers;
use wpvrt::presentation::routes;
use wpvrt::utils::retry_policy::RetryPolicy;
use wpvrt::utils::robots::RobotsChecker;
use wpvrt::utils::telemetry;
use wpvrt::workers::concurrency_controller::ConcurrencyController;
use wpvrt::workers::manager::WorkerManager;
use wpvrt::workers::resource_monitor::{BudgetAdjuster, EmergencyWatcher, ResourceProbe};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting wpvrt...");

    // 2. Load configuration
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    if settings.metrics.enabled {
        metrics::init_metrics(settings.metrics_addr()?)?;
        info!(addr = %settings.metrics.listen_addr, "Prometheus exporter listening");
    }

    // 3. Storage and repositories
    let storage = create_storage_repository(&settings.storage)?;
    let sites: Arc<dyn SiteRepository> =
        Arc::new(StaticSiteRepository::load(&settings.sites.registry_path)?);
    let markers = Arc::new(StorageMarkerRepository::new(storage.clone()));
    let reports = Arc::new(StorageReportRepository::new(storage.clone()));
    info!(registry = %settings.sites.registry_path, "Site registry loaded");

    // 4. Engines
    let chromium = Arc::new(ChromiumEngine::new(
        settings.chromium_options(),
        settings.stabilizer_config(),
    ));
    let fetcher: Arc<dyn PageFetcher> = match settings.discovery.fetcher {
        FetcherKind::Http => Arc::new(HttpPageFetcher::new(
            &settings.discovery.user_agent,
            Duration::from_secs(settings.discovery.fetch_timeout_secs),
        )?),
        FetcherKind::Browser => chromium.clone(),
    };
    let robots = Arc::new(
        RobotsChecker::new(Duration::from_secs(settings.discovery.robots_cache_ttl_secs))
            .with_retry_policy(RetryPolicy::fast())
            .with_user_agent(settings.discovery.user_agent.clone())
            .with_fetch_timeout(Duration::from_secs(
                settings.discovery.robots_fetch_timeout_secs,
            )),
    );

    // 5. Concurrency controllers
    let site_controller = Arc::new(ConcurrencyController::new(
        settings.concurrency.site.to_config("site"),
    ));
    let page_controller = Arc::new(ConcurrencyController::new(
        settings.concurrency.page.to_config("page"),
    ));

    // 6. Pipeline and orchestrator
    let discoverer = Arc::new(LinkDiscoverer::new(
        fetcher,
        robots,
        settings.discovery.user_agent.clone(),
    ));
    let maintenance = Arc::new(SiteMaintenance::new(settings.maintenance_config())?);
    let pipeline = Arc::new(SitePipeline::new(
        discoverer,
        chromium,
        Arc::new(DiffEngine::new(settings.diff_options())),
        CaptureStore::new(storage.clone()),
        maintenance,
        markers,
        page_controller.clone(),
        settings.pipeline_config(),
    ));

    let notifier: Arc<dyn Notifier> = match &settings.notification.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(
            url.clone(),
            settings.notification.secret.clone().unwrap_or_default(),
            Duration::from_secs(settings.notification.timeout_secs.unwrap_or(10)),
        )?),
        None => {
            warn!("No webhook configured, batch summaries will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let orchestrator = Arc::new(
        Orchestrator::new(
            pipeline,
            site_controller.clone(),
            page_controller.clone(),
            settings.orchestrator_config(),
        )
        .with_reports(reports)
        .with_notifier(notifier),
    );
    let use_case = Arc::new(RunBatchUseCase::new(sites.clone(), orchestrator));

    // 7. Start resource workers
    let probe: Arc<dyn ResourceProbe> = Arc::new(SystemProbe::new());
    let controllers = vec![site_controller.clone(), page_controller.clone()];
    let mut worker_manager = WorkerManager::new();
    worker_manager.spawn(Arc::new(BudgetAdjuster::new(
        probe.clone(),
        controllers.clone(),
        Duration::from_millis(settings.concurrency.sample_interval_ms),
    )));
    worker_manager.spawn(Arc::new(EmergencyWatcher::new(
        probe,
        controllers,
        Duration::from_millis(settings.concurrency.emergency_interval_ms),
    )));
    info!(workers = worker_manager.len(), "Resource workers started");

    // 8. Start HTTP server
    let app = routes::routes(
        use_case,
        sites,
        Controllers {
            site: site_controller,
            page: page_controller,
        },
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker_manager.shutdown();
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
