// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::engines::traits::{EngineError, FetchedPage, PageFetcher};

/// HTTP 页面获取器
///
/// 基于 reqwest 的链接发现用获取器，不执行 JavaScript
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, EngineError> {
        let response = self.client.get(url.clone()).send().await?;
        let status_code = response.status().as_u16();
        let final_url = response.url().clone();

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);

        let html = if is_html {
            response.text().await?
        } else {
            String::new()
        };

        Ok(FetchedPage {
            final_url,
            status_code,
            html,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
#[path = "http_fetcher_test.rs"]
mod tests;
