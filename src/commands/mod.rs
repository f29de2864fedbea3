// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod budgets;
pub mod cards;
pub mod daemon;
pub mod doctor;
pub mod goals;
pub mod portfolio;
pub mod recurring;
pub mod settings;
pub mod transactions;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::path::PathBuf;

use crate::config::{AppConfig, Policy};
use crate::utils::{get_reporting_currency, parse_date, parse_decimal};

/// Everything a handler needs: the open store, the tenant and the loaded
/// config.
pub struct Session {
    pub conn: Connection,
    pub user: String,
    pub cfg: AppConfig,
    pub db_path: PathBuf,
}

impl Session {
    pub fn policy(&self) -> &Policy {
        &self.cfg.policy
    }

    pub fn attempts(&self) -> u32 {
        self.cfg.policy.max_commit_attempts
    }

    pub fn currency(&self) -> Result<String> {
        get_reporting_currency(&self.conn, &self.cfg)
    }
}

pub(crate) fn arg_str<'a>(m: &'a clap::ArgMatches, name: &str) -> Result<&'a str> {
    m.get_one::<String>(name)
        .map(|s| s.trim())
        .with_context(|| format!("--{} is required", name))
}

pub(crate) fn arg_decimal(m: &clap::ArgMatches, name: &str) -> Result<Decimal> {
    parse_decimal(arg_str(m, name)?)
}

pub(crate) fn opt_decimal(m: &clap::ArgMatches, name: &str) -> Result<Option<Decimal>> {
    m.get_one::<String>(name).map(|s| parse_decimal(s)).transpose()
}

pub(crate) fn opt_date(m: &clap::ArgMatches, name: &str) -> Result<Option<NaiveDate>> {
    m.get_one::<String>(name).map(|s| parse_date(s)).transpose()
}

pub(crate) fn arg_u32(m: &clap::ArgMatches, name: &str) -> Result<u32> {
    m.get_one::<u32>(name)
        .copied()
        .with_context(|| format!("--{} is required", name))
}

/// `--date` when given, otherwise today in UTC.
pub(crate) fn as_of(m: &clap::ArgMatches) -> Result<NaiveDate> {
    Ok(opt_date(m, "date")?.unwrap_or_else(|| Utc::now().date_naive()))
}
