// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::pricing::cache;

const UA: &str = concat!(
    "paycycle/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/alphavelocity/paycycle)"
);

static TRACING: Once = Once::new();

/// Installs the stderr subscriber once; `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("paycycle=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}

pub fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    let c = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(UA)
        .build()?;
    Ok(c)
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

pub fn parse_decimal(s: &str) -> Result<Decimal> {
    s.trim()
        .parse::<Decimal>()
        .with_context(|| format!("Invalid decimal '{}'", s))
}

pub fn fmt_money(d: &Decimal, ccy: &str) -> String {
    format!("{} {:.2}", ccy, d.round_dp(2))
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(json_flag: bool, v: &T) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    Ok(false)
}

// Reporting currency: the app_settings row wins over config.json.
pub fn get_reporting_currency(conn: &Connection, cfg: &AppConfig) -> Result<String> {
    let v: Option<String> = conn
        .query_row(
            "SELECT value FROM app_settings WHERE key='reporting_currency'",
            [],
            |r| r.get(0),
        )
        .optional()?;
    Ok(v.unwrap_or_else(|| cfg.reporting_currency.clone())
        .trim()
        .to_ascii_uppercase())
}

/// Switches the reporting currency and drops quotes priced in the old one.
pub fn set_reporting_currency(conn: &Connection, ccy: &str) -> Result<()> {
    let ccy = ccy.trim().to_ascii_uppercase();
    if ccy.len() != 3 || !ccy.chars().all(|c| c.is_ascii_alphabetic()) {
        anyhow::bail!("Invalid currency code '{}'", ccy);
    }
    conn.execute(
        "INSERT INTO app_settings(key, value) VALUES('reporting_currency', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![ccy],
    )?;
    cache::purge(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn reporting_currency_prefers_stored_value() {
        let conn = open_in_memory().unwrap();
        let cfg = AppConfig::default();
        assert_eq!(get_reporting_currency(&conn, &cfg).unwrap(), "TRY");
        set_reporting_currency(&conn, "eur").unwrap();
        assert_eq!(get_reporting_currency(&conn, &cfg).unwrap(), "EUR");
        assert!(set_reporting_currency(&conn, "euro").is_err());
    }

    #[test]
    fn parsers_trim_input() {
        assert_eq!(parse_decimal(" 10.50 ").unwrap(), Decimal::new(1050, 2));
        assert_eq!(
            parse_date(" 2024-02-29 ").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn money_has_two_places() {
        assert_eq!(fmt_money(&Decimal::new(12346, 3), "TRY"), "TRY 12.35");
    }
}
