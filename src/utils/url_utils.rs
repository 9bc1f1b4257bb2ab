// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use url::{ParseError, Url};

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

/// 归一化URL：只保留 scheme + host(+port) + path，去掉查询串与片段
///
/// 非 http/https 链接返回 None
pub fn normalize_url(url: &Url) -> Option<String> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    let host = url.host_str()?.to_lowercase();
    let mut normalized = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        normalized.push_str(&format!(":{}", port));
    }
    let path = if url.path().is_empty() { "/" } else { url.path() };
    normalized.push_str(path);
    Some(normalized)
}

/// 两个URL是否属于同一主机名
pub fn same_host(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

/// 由URL路径生成稳定的页面标识
///
/// 路径段以 `_` 连接，根路径记为 `index`；不安全字符替换为 `-`，
/// 保证同一路径在基线与对比两次截图中得到相同标识
pub fn page_id_from_url(url: &Url) -> String {
    let segments: Vec<String> = url
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            decoded
                .chars()
                .map(|c| {
                    if c.is_alphanumeric() || c == '-' || c == '.' {
                        c
                    } else {
                        '-'
                    }
                })
                .collect()
        })
        .collect();

    if segments.is_empty() {
        "index".to_string()
    } else {
        segments.join("_")
    }
}
