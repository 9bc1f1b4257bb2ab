// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::models::marker::KnownGoodMarker;
use crate::domain::repositories::marker_repository::MarkerRepository;
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::utils::errors::RepositoryError;

/// 基于对象存储的已知良好标记仓库
///
/// 每个站点只保留最新一条：`markers/{siteId}/latest.json`
pub struct StorageMarkerRepository {
    storage: Arc<dyn StorageRepository>,
}

impl StorageMarkerRepository {
    pub fn new(storage: Arc<dyn StorageRepository>) -> Self {
        Self { storage }
    }

    fn key(site_id: &str) -> String {
        format!("markers/{}/latest.json", site_id)
    }
}

#[async_trait]
impl MarkerRepository for StorageMarkerRepository {
    async fn latest(&self, site_id: &str) -> Result<Option<KnownGoodMarker>, RepositoryError> {
        match self.storage.get(&Self::key(site_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn record(&self, marker: &KnownGoodMarker) -> Result<(), RepositoryError> {
        let bytes = serde_json::to_vec_pretty(marker)?;
        self.storage.save(&Self::key(&marker.site_id), &bytes).await?;
        tracing::debug!(site_id = %marker.site_id, reference = %marker.reference, "Known-good marker recorded");
        Ok(())
    }
}
