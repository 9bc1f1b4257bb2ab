// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

use crate::domain::models::outcome::{BatchSummary, SiteOutcome};
use crate::domain::repositories::report_repository::ReportRepository;
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::utils::errors::RepositoryError;

/// 基于对象存储的报告仓库
///
/// `reports/{YYYY-MM-DD}/{batchId}/summary.json` 与 `…/sites/{siteId}.json`
pub struct StorageReportRepository {
    storage: Arc<dyn StorageRepository>,
}

impl StorageReportRepository {
    pub fn new(storage: Arc<dyn StorageRepository>) -> Self {
        Self { storage }
    }

    fn batch_prefix(run_date: NaiveDate, batch_id: &str) -> String {
        format!("reports/{}/{}", run_date.format("%Y-%m-%d"), batch_id)
    }
}

#[async_trait]
impl ReportRepository for StorageReportRepository {
    async fn save_outcome(
        &self,
        run_date: NaiveDate,
        batch_id: &str,
        outcome: &SiteOutcome,
    ) -> Result<(), RepositoryError> {
        let key = format!(
            "{}/sites/{}.json",
            Self::batch_prefix(run_date, batch_id),
            outcome.site_id
        );
        let bytes = serde_json::to_vec_pretty(outcome)?;
        self.storage.save(&key, &bytes).await?;
        Ok(())
    }

    async fn save_summary(&self, summary: &BatchSummary) -> Result<(), RepositoryError> {
        let key = format!(
            "{}/summary.json",
            Self::batch_prefix(summary.run_date, &summary.batch_id)
        );
        let bytes = serde_json::to_vec_pretty(summary)?;
        self.storage.save(&key, &bytes).await?;
        Ok(())
    }

    async fn find_summary(
        &self,
        run_date: NaiveDate,
        batch_id: &str,
    ) -> Result<Option<BatchSummary>, RepositoryError> {
        let key = format!("{}/summary.json", Self::batch_prefix(run_date, batch_id));
        match self.storage.get(&key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::run::RunMode;
    use crate::infrastructure::storage::InMemoryStorage;
    use crate::utils::errors::VrtError;
    use chrono::Utc;

    #[tokio::test]
    async fn test_summary_and_outcomes_are_stored_per_batch() {
        let storage = Arc::new(InMemoryStorage::new());
        let repo = StorageReportRepository::new(storage.clone());
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let outcome = SiteOutcome::failed_before_start(
            "blog",
            &VrtError::ResourceExhausted("cpu".into()),
        );
        repo.save_outcome(date, "b1", &outcome).await.unwrap();

        let summary =
            BatchSummary::from_outcomes("b1", date, RunMode::Full, true, Utc::now(), vec![outcome]);
        repo.save_summary(&summary).await.unwrap();

        assert!(storage
            .exists("reports/2024-05-01/b1/sites/blog.json")
            .await
            .unwrap());
        let loaded = repo.find_summary(date, "b1").await.unwrap().unwrap();
        assert_eq!(loaded.failure_count, 1);
        assert!(loaded.emergency_stopped);
        assert!(repo.find_summary(date, "other").await.unwrap().is_none());
    }
}
