use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ads::{RegistryPolicy, DEFAULT_MIN_REQUEST_INTERVAL_MS, DEFAULT_TARGET_COUNT};
use crate::retention::DEFAULT_REMIND_AFTER_DAYS;

pub const CONFIG_FILE_NAME: &str = "diag_config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub ad_min_request_interval_ms: Option<u64>,
    pub ad_target_count: Option<usize>,
    pub disable_ads: Option<bool>,
    pub retention_remind_after_days: Option<u32>,
}

/// Read `<data_dir>/diag_config.json`. A missing or malformed file yields the
/// defaults; config must never keep the app from starting.
pub fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config");
            AppConfig::default()
        }
    }
}

pub fn default_app_config_json() -> String {
    let defaults = AppConfig {
        ad_min_request_interval_ms: Some(DEFAULT_MIN_REQUEST_INTERVAL_MS),
        ad_target_count: Some(DEFAULT_TARGET_COUNT),
        disable_ads: Some(false),
        retention_remind_after_days: Some(DEFAULT_REMIND_AFTER_DAYS),
    };
    serde_json::to_string_pretty(&defaults).unwrap_or_else(|_| "{}".to_string())
}

impl AppConfig {
    pub fn ads_enabled(&self) -> bool {
        if let Some(disable) = self.disable_ads {
            return !disable;
        }
        std::env::var("DIAG_DISABLE_ADS").ok().as_deref() != Some("1")
    }

    pub fn registry_policy(&self) -> RegistryPolicy {
        let defaults = RegistryPolicy::default();
        RegistryPolicy {
            min_request_interval_ms: self
                .ad_min_request_interval_ms
                .unwrap_or(defaults.min_request_interval_ms),
            target_count: self
                .ad_target_count
                .filter(|n| *n > 0)
                .unwrap_or(defaults.target_count),
        }
    }

    pub fn remind_after_days(&self) -> u32 {
        self.retention_remind_after_days
            .unwrap_or(DEFAULT_REMIND_AFTER_DAYS)
    }
}
