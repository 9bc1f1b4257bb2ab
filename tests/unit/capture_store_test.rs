// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tempfile::tempdir;

use wpvrt::domain::models::capture::{Capture, Phase};
use wpvrt::infrastructure::capture_store::CaptureStore;
use wpvrt::infrastructure::storage::LocalStorage;

use crate::integration::helpers::page_png;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

#[tokio::test]
async fn captures_land_in_phase_date_site_layout() {
    let dir = tempdir().unwrap();
    let store = CaptureStore::new(Arc::new(LocalStorage::new(dir.path())));

    let capture = Capture::from_image_bytes("blog", "about_team", Phase::Baseline, page_png(0), Utc::now());
    let key = store
        .save_capture(&capture, date(), Some("https://blog.example.com/about/team/"))
        .await
        .unwrap();

    assert_eq!(key, "baseline/2025-06-01/blog/about_team.png");
    assert!(dir.path().join("baseline/2025-06-01/blog/about_team.png").exists());
    assert!(dir
        .path()
        .join("baseline/2025-06-01/blog/about_team.png.json")
        .exists());

    let pages = store.list_pages(Phase::Baseline, date(), "blog").await.unwrap();
    assert_eq!(pages, vec!["about_team".to_string()]);

    let loaded = store
        .load_capture("blog", "about_team", Phase::Baseline, date())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.width, 40);
    assert_eq!(loaded.height, 10);
    assert_eq!(loaded.captured_at, capture.captured_at);
}

#[tokio::test]
async fn missing_capture_loads_as_none() {
    let dir = tempdir().unwrap();
    let store = CaptureStore::new(Arc::new(LocalStorage::new(dir.path())));

    let loaded = store
        .load_capture("blog", "index", Phase::After, date())
        .await
        .unwrap();
    assert!(loaded.is_none());
    assert!(store
        .list_pages(Phase::After, date(), "blog")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn diff_images_are_grouped_by_threshold() {
    let dir = tempdir().unwrap();
    let store = CaptureStore::new(Arc::new(LocalStorage::new(dir.path())));

    let key = store
        .save_diff(date(), "blog", 2.0, "index", &page_png(3))
        .await
        .unwrap();

    assert_eq!(key, "diff/2025-06-01/blog/2/index.png");
    assert!(dir.path().join(&key).exists());
}
