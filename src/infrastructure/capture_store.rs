// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use crate::domain::models::capture::{Capture, CaptureMeta, Phase};
use crate::domain::repositories::storage_repository::{StorageError, StorageRepository};
use crate::utils::errors::VrtError;

const IMAGE_SUFFIX: &str = ".png";
const META_SUFFIX: &str = ".png.json";

/// 截图与差异图的存储布局
///
/// - 截图：`{phase}/{YYYY-MM-DD}/{siteId}/{urlEncodedPageId}.png`，元数据写在同名 `.png.json`
/// - 差异图：`diff/{YYYY-MM-DD}/{siteId}/{threshold}/{pageId}.png`
///
/// 同一个键重复写入时直接覆盖，重跑结果取代旧结果
#[derive(Clone)]
pub struct CaptureStore {
    storage: Arc<dyn StorageRepository>,
}

impl CaptureStore {
    pub fn new(storage: Arc<dyn StorageRepository>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn StorageRepository> {
        &self.storage
    }

    pub fn capture_key(phase: Phase, date: NaiveDate, site_id: &str, page_id: &str) -> String {
        format!(
            "{}{}{}",
            Self::capture_prefix(phase, date, site_id),
            urlencoding::encode(page_id),
            IMAGE_SUFFIX
        )
    }

    pub fn capture_prefix(phase: Phase, date: NaiveDate, site_id: &str) -> String {
        format!("{}/{}/{}/", phase.as_str(), date.format("%Y-%m-%d"), site_id)
    }

    pub fn diff_key(date: NaiveDate, site_id: &str, threshold: f64, page_id: &str) -> String {
        format!(
            "diff/{}/{}/{}/{}{}",
            date.format("%Y-%m-%d"),
            site_id,
            format_threshold(threshold),
            page_id,
            IMAGE_SUFFIX
        )
    }

    /// 写入截图及其元数据，返回图片键
    pub async fn save_capture(
        &self,
        capture: &Capture,
        date: NaiveDate,
        url: Option<&str>,
    ) -> Result<String, VrtError> {
        let key = Self::capture_key(capture.phase, date, &capture.site_id, &capture.page_id);
        self.storage
            .save(&key, &capture.image)
            .await
            .map_err(storage_error)?;

        let meta = CaptureMeta {
            url: url.map(str::to_string),
            width: capture.width,
            height: capture.height,
            captured_at: capture.captured_at,
        };
        let meta_bytes =
            serde_json::to_vec(&meta).map_err(|e| VrtError::Internal(e.to_string()))?;
        self.storage
            .save(&format!("{}.json", key), &meta_bytes)
            .await
            .map_err(storage_error)?;

        Ok(key)
    }

    /// 读取截图，不存在时返回 `None`
    pub async fn load_capture(
        &self,
        site_id: &str,
        page_id: &str,
        phase: Phase,
        date: NaiveDate,
    ) -> Result<Option<Capture>, VrtError> {
        let key = Self::capture_key(phase, date, site_id, page_id);
        let Some(image) = self.storage.get(&key).await.map_err(storage_error)? else {
            return Ok(None);
        };

        // a missing or unreadable sidecar only loses the timestamp
        let captured_at = match self.storage.get(&format!("{}.json", key)).await {
            Ok(Some(bytes)) => serde_json::from_slice::<CaptureMeta>(&bytes)
                .map(|meta| meta.captured_at)
                .unwrap_or_else(|_| Utc::now()),
            _ => Utc::now(),
        };

        Ok(Some(Capture::from_image_bytes(
            site_id, page_id, phase, image, captured_at,
        )))
    }

    /// 写入差异图，返回键
    pub async fn save_diff(
        &self,
        date: NaiveDate,
        site_id: &str,
        threshold: f64,
        page_id: &str,
        image: &[u8],
    ) -> Result<String, VrtError> {
        let key = Self::diff_key(date, site_id, threshold, page_id);
        self.storage.save(&key, image).await.map_err(storage_error)?;
        Ok(key)
    }

    /// 列出某阶段、某日期下站点已存储截图的页面标识
    pub async fn list_pages(
        &self,
        phase: Phase,
        date: NaiveDate,
        site_id: &str,
    ) -> Result<Vec<String>, VrtError> {
        let prefix = Self::capture_prefix(phase, date, site_id);
        let keys = self.storage.list(&prefix).await.map_err(storage_error)?;

        Ok(keys
            .iter()
            .filter(|key| !key.ends_with(META_SUFFIX))
            .filter_map(|key| key.strip_prefix(&prefix)?.strip_suffix(IMAGE_SUFFIX))
            .filter(|name| !name.contains('/'))
            .map(|name| {
                urlencoding::decode(name)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| name.to_string())
            })
            .collect())
    }
}

fn storage_error(err: StorageError) -> VrtError {
    VrtError::Storage(err.to_string())
}

/// 阈值目录名，去掉多余的小数位（`2.0` → `2`，`0.5` → `0.5`）
pub fn format_threshold(threshold: f64) -> String {
    let formatted = format!("{:.4}", threshold);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemoryStorage;
    use chrono::TimeZone;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(
            CaptureStore::capture_key(Phase::Baseline, date(), "blog", "about us"),
            "baseline/2024-05-01/blog/about%20us.png"
        );
        assert_eq!(
            CaptureStore::diff_key(date(), "blog", 2.0, "index"),
            "diff/2024-05-01/blog/2/index.png"
        );
        assert_eq!(format_threshold(0.5), "0.5");
        assert_eq!(format_threshold(10.25), "10.25");
    }

    #[tokio::test]
    async fn test_capture_roundtrip_keeps_timestamp() {
        let storage = Arc::new(InMemoryStorage::new());
        let store = CaptureStore::new(storage.clone());
        let captured_at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let capture = Capture::from_image_bytes("blog", "index", Phase::After, vec![1, 2, 3], captured_at);

        let key = store
            .save_capture(&capture, date(), Some("https://blog.example.com/"))
            .await
            .unwrap();
        assert_eq!(key, "after/2024-05-01/blog/index.png");
        assert!(storage.exists("after/2024-05-01/blog/index.png.json").await.unwrap());

        let loaded = store
            .load_capture("blog", "index", Phase::After, date())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.image, vec![1, 2, 3]);
        assert_eq!(loaded.captured_at, captured_at);

        assert!(store
            .load_capture("blog", "index", Phase::Baseline, date())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_pages_skips_sidecars() {
        let store = CaptureStore::new(Arc::new(InMemoryStorage::new()));
        for page in ["index", "about us", "blog_hello"] {
            let capture = Capture::from_image_bytes("blog", page, Phase::Baseline, vec![0], Utc::now());
            store.save_capture(&capture, date(), None).await.unwrap();
        }

        let pages = store.list_pages(Phase::Baseline, date(), "blog").await.unwrap();
        assert_eq!(pages, vec!["about us", "blog_hello", "index"]);
        assert!(store
            .list_pages(Phase::After, date(), "blog")
            .await
            .unwrap()
            .is_empty());
    }
}
