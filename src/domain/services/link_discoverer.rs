// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use url::Url;

use crate::domain::models::page::PageRecord;
use crate::domain::models::site::CrawlLimits;
use crate::engines::traits::PageFetcher;
use crate::utils::robots::RobotsCheckerTrait;
use crate::utils::url_utils;

/// 不作为页面处理的路径前缀（后台、登录、API）
const EXCLUDED_PATH_PREFIXES: &[&str] = &["/wp-admin", "/wp-login.php", "/wp-json", "/xmlrpc.php"];

/// 不作为页面处理的文件扩展名
const EXCLUDED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "ico", "pdf", "zip", "gz", "mp4", "mp3", "css",
    "js", "xml", "json", "txt", "doc", "docx", "xls", "xlsx",
];

/// 链接发现器
///
/// 从根URL开始广度优先遍历同主机链接。每个出队的URL先经过 robots 检查，
/// 被禁止的URL既不记录也不展开；加载失败的URL仍会被记录（带 `load_error`），但不再展开
pub struct LinkDiscoverer {
    fetcher: Arc<dyn PageFetcher>,
    robots: Arc<dyn RobotsCheckerTrait>,
    user_agent: String,
}

impl LinkDiscoverer {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        robots: Arc<dyn RobotsCheckerTrait>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            robots,
            user_agent: user_agent.into(),
        }
    }

    /// 发现站点页面，返回按发现顺序排列的页面记录
    #[tracing::instrument(skip(self), fields(root = %root))]
    pub async fn discover(&self, root: &Url, limits: CrawlLimits) -> Vec<PageRecord> {
        let mut discovered: Vec<PageRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(Url, u32)> = VecDeque::new();

        let mut root = root.clone();
        root.set_fragment(None);
        root.set_query(None);
        if let Some(key) = url_utils::normalize_url(&root) {
            seen.insert(key);
        }
        queue.push_back((root.clone(), 0));

        while let Some((url, depth)) = queue.pop_front() {
            if discovered.len() >= limits.max_urls {
                break;
            }

            if !self.allowed(&url).await {
                tracing::debug!(url = %url, "Skipping URL disallowed by robots policy");
                continue;
            }

            let record = PageRecord::new(&url, depth);
            let page = match self.fetcher.fetch(&url).await {
                Ok(page) if page.is_success() => page,
                Ok(page) => {
                    tracing::warn!(url = %url, status = page.status_code, "Page returned non-success status");
                    discovered.push(record.with_load_error(format!("HTTP {}", page.status_code)));
                    continue;
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Failed to load page during discovery");
                    discovered.push(record.with_load_error(e.to_string()));
                    continue;
                }
            };
            discovered.push(record);

            if depth >= limits.max_depth {
                continue;
            }

            for link in extract_links(&page.html, &page.final_url) {
                if !url_utils::same_host(&link, &root) || !is_page_link(&link) {
                    continue;
                }
                let Some(key) = url_utils::normalize_url(&link) else {
                    continue;
                };
                if seen.insert(key) {
                    queue.push_back((link, depth + 1));
                }
            }
        }

        tracing::info!(pages = discovered.len(), "Discovery finished");
        discovered
    }

    async fn allowed(&self, url: &Url) -> bool {
        match self.robots.is_allowed(url.as_str(), &self.user_agent).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Robots check failed, allowing URL");
                true
            }
        }
    }
}

/// 从HTML中按文档顺序提取链接（已解析为绝对地址，去掉查询串与片段）
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with("javascript:")
        {
            continue;
        }
        if let Ok(mut url) = url_utils::resolve_url(base, href) {
            if url.scheme() == "http" || url.scheme() == "https" {
                url.set_fragment(None);
                url.set_query(None);
                links.push(url);
            }
        }
    }
    links
}

fn is_page_link(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    if EXCLUDED_PATH_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return false;
    }
    if path.ends_with("/feed/") || path.ends_with("/feed") {
        return false;
    }
    match path.rsplit('/').next().and_then(|last| last.rsplit_once('.')) {
        Some((_, ext)) => !EXCLUDED_EXTENSIONS.contains(&ext),
        None => true,
    }
}

#[cfg(test)]
#[path = "link_discoverer_test.rs"]
mod tests;
