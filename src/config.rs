// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Paycycle", "paycycle"));

pub const USER_ENV: &str = "PAYCYCLE_USER";

/// Tunable policy constants. None of these are laws of finance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Share of the statement debt quoted as the minimum card payment.
    pub min_payment_rate: Decimal,
    /// 22 carat purity factor applied to gold coins.
    pub gold_coin_purity: Decimal,
    /// Dealer premium applied on top of the purity-adjusted coin price.
    pub gold_coin_premium: Decimal,
    pub price_cache_ttl_secs: u64,
    pub refresh_interval_secs: u64,
    pub materialize_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub max_commit_attempts: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            min_payment_rate: Decimal::new(20, 2),
            gold_coin_purity: Decimal::new(916, 3),
            gold_coin_premium: Decimal::new(102, 2),
            price_cache_ttl_secs: 300,
            refresh_interval_secs: 60,
            materialize_interval_secs: 3600,
            fetch_timeout_secs: 8,
            max_commit_attempts: 3,
        }
    }
}

impl Policy {
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.price_cache_ttl_secs as i64)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn materialize_interval(&self) -> Duration {
        Duration::from_secs(self.materialize_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Base URLs of the market-data endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub crypto: String,
    pub forex_convert: String,
    pub forex_latest: String,
    pub metals: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            crypto: "https://api.coingecko.com/api/v3".to_string(),
            forex_convert: "https://api.exchangerate.host".to_string(),
            forex_latest: "https://api.frankfurter.dev/v1".to_string(),
            metals: "https://api.metalpriceapi.com/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub user_id: String,
    pub reporting_currency: String,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub endpoints: Endpoints,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_id: "local".to_string(),
            reporting_currency: "TRY".to_string(),
            policy: Policy::default(),
            endpoints: Endpoints::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    pub fn db_file(&self) -> PathBuf {
        self.data_dir.join("paycycle.sqlite")
    }
}

pub fn app_paths(override_home: Option<PathBuf>) -> Result<AppPaths> {
    if let Some(home) = override_home {
        return Ok(AppPaths {
            config_dir: home.join("config"),
            data_dir: home.join("data"),
        });
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    Ok(AppPaths {
        config_dir: proj.config_dir().to_path_buf(),
        data_dir: proj.data_dir().to_path_buf(),
    })
}

pub fn load_or_init_config(paths: &AppPaths) -> Result<AppConfig> {
    fs::create_dir_all(&paths.config_dir)
        .with_context(|| format!("Failed to create config dir {}", paths.config_dir.display()))?;
    let cfg_path = paths.config_file();
    if !cfg_path.exists() {
        let cfg = AppConfig::default();
        write_config(&cfg_path, &cfg)?;
        return Ok(cfg);
    }
    let raw = fs::read_to_string(&cfg_path)
        .with_context(|| format!("Failed to read {}", cfg_path.display()))?;
    let cfg: AppConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", cfg_path.display()))?;
    Ok(cfg)
}

pub fn write_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(cfg)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Resolves the tenant key: explicit flag, then environment, then config.
pub fn resolve_user(flag: Option<&str>, cfg: &AppConfig) -> String {
    flag.map(str::to_string)
        .or_else(|| std::env::var(USER_ENV).ok())
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| cfg.user_id.clone())
}
