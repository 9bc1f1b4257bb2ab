// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    application::dto::run_request::RunRequestDto,
    domain::{
        models::{outcome::BatchSummary, run::RunContext, site::Site},
        repositories::site_repository::SiteRepository,
        services::orchestrator::Orchestrator,
    },
    utils::errors::RepositoryError,
};

#[derive(Error, Debug)]
pub enum RunUseCaseError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Unknown sites: {}", .0.join(", "))]
    SiteNotFound(Vec<String>),
    #[error("Another batch is already running")]
    Busy,
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// 批次运行用例
///
/// 解析站点选择并交给编排器执行。同一时间只允许一个批次，
/// 因为站点级和页面级预算在批次之间共享
pub struct RunBatchUseCase {
    sites: Arc<dyn SiteRepository>,
    orchestrator: Arc<Orchestrator>,
    running: Mutex<()>,
}

impl RunBatchUseCase {
    pub fn new(sites: Arc<dyn SiteRepository>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            sites,
            orchestrator,
            running: Mutex::new(()),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub async fn execute(&self, dto: RunRequestDto) -> Result<BatchSummary, RunUseCaseError> {
        dto.check().map_err(RunUseCaseError::ValidationError)?;

        let sites = self.resolve_sites(&dto.selection()).await?;
        if sites.is_empty() {
            return Err(RunUseCaseError::ValidationError(
                "no sites selected".to_string(),
            ));
        }

        let _guard = self.running.try_lock().map_err(|_| RunUseCaseError::Busy)?;
        let ctx = RunContext::new(dto.options());
        Ok(self.orchestrator.run_batch(sites, &ctx).await)
    }

    async fn resolve_sites(&self, selection: &[String]) -> Result<Vec<Site>, RunUseCaseError> {
        if selection.is_empty() {
            return Ok(self.sites.list().await?);
        }

        let mut sites = Vec::with_capacity(selection.len());
        let mut unknown = Vec::new();
        for id in selection {
            match self.sites.find(id).await? {
                Some(site) => sites.push(site),
                None => unknown.push(id.clone()),
            }
        }
        if !unknown.is_empty() {
            return Err(RunUseCaseError::SiteNotFound(unknown));
        }
        Ok(sites)
    }
}
