// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

use wpvrt::domain::models::site::UpdateMethod;
use wpvrt::domain::repositories::site_repository::SiteRepository;
use wpvrt::infrastructure::repositories::site_repo_impl::StaticSiteRepository;

#[tokio::test]
async fn registry_file_is_loaded_in_declaration_order() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
sites:
  - id: marketing
    root_url: https://www.example.com/
    limits:
      max_urls: 30
      max_depth: 1
    update_method:
      type: webhook
      update_url: https://ops.example.com/hooks/marketing/update
  - id: docs
    root_url: https://docs.example.com/
"#
    )
    .unwrap();

    let repo = StaticSiteRepository::load(file.path()).unwrap();
    let sites = repo.list().await.unwrap();

    assert_eq!(
        sites.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        vec!["marketing", "docs"]
    );
    assert_eq!(sites[0].limits.max_urls, 30);
    assert!(matches!(sites[0].update_method, UpdateMethod::Webhook { .. }));
    assert_eq!(sites[1].update_method, UpdateMethod::None);
    assert!(repo.find("docs").await.unwrap().is_some());
    assert!(repo.find("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn missing_registry_file_starts_empty() {
    let dir = tempdir().unwrap();
    let repo = StaticSiteRepository::load(dir.path().join("sites.yaml")).unwrap();
    assert!(repo.list().await.unwrap().is_empty());
}

#[test]
fn duplicate_or_invalid_sites_are_rejected() {
    let duplicate = r#"
sites:
  - id: blog
    root_url: https://blog.example.com/
  - id: blog
    root_url: https://blog2.example.com/
"#;
    assert!(StaticSiteRepository::from_yaml(duplicate).is_err());

    let invalid = r#"
sites:
  - id: blog
    root_url: ftp://blog.example.com/
"#;
    assert!(StaticSiteRepository::from_yaml(invalid).is_err());
}
