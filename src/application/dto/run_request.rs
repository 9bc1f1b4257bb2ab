// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::models::run::{RunMode, RunOptions};

/// 批次运行请求
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RunRequestDto {
    /// 站点选择，缺省或为空时运行全部已注册站点
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub sites: Option<Vec<String>>,
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default)]
    pub auto_update: bool,
    #[serde(default)]
    pub rollback_on_critical: bool,
    #[validate(range(min = 1, max = 64))]
    pub site_concurrency: Option<usize>,
    #[validate(range(min = 1, max = 64))]
    pub page_concurrency: Option<usize>,
    pub baseline_date: Option<NaiveDate>,
    pub after_date: Option<NaiveDate>,
}

impl RunRequestDto {
    /// 字段校验之外的跨字段检查
    pub fn check(&self) -> Result<(), String> {
        self.validate().map_err(|e| e.to_string())?;
        if let (Some(baseline), Some(after)) = (self.baseline_date, self.after_date) {
            if after < baseline {
                return Err(format!(
                    "afterDate {} is earlier than baselineDate {}",
                    after, baseline
                ));
            }
        }
        Ok(())
    }

    /// 去重后的站点选择，保持请求中的顺序
    pub fn selection(&self) -> Vec<String> {
        let mut selected: Vec<String> = Vec::new();
        for id in self.sites.iter().flatten() {
            let id = id.trim();
            if !id.is_empty() && !selected.iter().any(|s| s == id) {
                selected.push(id.to_string());
            }
        }
        selected
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            mode: self.mode,
            auto_update: self.auto_update,
            rollback_on_critical: self.rollback_on_critical,
            site_concurrency: self.site_concurrency,
            page_concurrency: self.page_concurrency,
            baseline_date: self.baseline_date,
            after_date: self.after_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_to_full_mode_for_all_sites() {
        let dto: RunRequestDto = serde_json::from_str("{}").unwrap();
        assert_eq!(dto.mode, RunMode::Full);
        assert!(dto.selection().is_empty());
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn test_selection_is_trimmed_and_deduplicated() {
        let dto: RunRequestDto = serde_json::from_str(
            r#"{"sites": ["blog", " shop ", "blog", ""], "mode": "compare", "rollbackOnCritical": true}"#,
        )
        .unwrap();
        assert_eq!(dto.selection(), vec!["blog", "shop"]);
        let options = dto.options();
        assert_eq!(options.mode, RunMode::Compare);
        assert!(options.rollback_on_critical);
        assert!(!options.auto_update);
    }

    #[test]
    fn test_validation_rejects_bad_overrides() {
        let dto = RunRequestDto {
            page_concurrency: Some(0),
            ..Default::default()
        };
        assert!(dto.check().is_err());

        let dto = RunRequestDto {
            baseline_date: NaiveDate::from_ymd_opt(2025, 6, 2),
            after_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            ..Default::default()
        };
        assert!(dto.validate().is_ok());
        assert!(dto.check().unwrap_err().contains("earlier"));
    }
}
