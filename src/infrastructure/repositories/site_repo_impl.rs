// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::domain::models::site::Site;
use crate::domain::repositories::site_repository::SiteRepository;
use crate::utils::errors::RepositoryError;

#[derive(Debug, Deserialize)]
struct SiteRegistry {
    #[serde(default)]
    sites: Vec<Site>,
}

/// 静态站点注册表
///
/// 启动时从 YAML 文件加载一次，运行期间只读
#[derive(Debug, Clone, Default)]
pub struct StaticSiteRepository {
    sites: Vec<Site>,
}

impl StaticSiteRepository {
    pub fn new(sites: Vec<Site>) -> Result<Self, RepositoryError> {
        let mut seen = HashSet::new();
        for site in &sites {
            site.validate()
                .map_err(|e| RepositoryError::InvalidData(format!("site '{}': {}", site.id, e)))?;
            if !seen.insert(site.id.as_str()) {
                return Err(RepositoryError::InvalidData(format!(
                    "duplicate site id '{}'",
                    site.id
                )));
            }
        }
        Ok(Self { sites })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, RepositoryError> {
        let registry: SiteRegistry = serde_yaml::from_str(yaml)
            .map_err(|e| RepositoryError::InvalidData(format!("invalid site registry: {}", e)))?;
        Self::new(registry.sites)
    }

    /// 读取注册表文件；文件不存在时返回空注册表
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_yaml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Site registry {} not found, starting empty", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(RepositoryError::Storage(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[async_trait]
impl SiteRepository for StaticSiteRepository {
    async fn list(&self) -> Result<Vec<Site>, RepositoryError> {
        Ok(self.sites.clone())
    }

    async fn find(&self, site_id: &str) -> Result<Option<Site>, RepositoryError> {
        Ok(self.sites.iter().find(|s| s.id == site_id).cloned())
    }
}
