// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::AppPaths;
use crate::errors::{LedgerError, LedgerResult};
use crate::models::Instant;

pub fn open_or_init(paths: &AppPaths) -> Result<Connection> {
    fs::create_dir_all(&paths.data_dir).context("Failed to create data dir")?;
    open_at(&paths.db_file())
}

pub fn open_at(path: &Path) -> Result<Connection> {
    let mut conn =
        Connection::open(path).with_context(|| format!("Open DB at {}", path.display()))?;
    conn.busy_timeout(Duration::from_secs(5))?;
    init_schema(&mut conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    init_schema(&mut conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS app_settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    -- one row per user: payment day, balance and optimistic version
    CREATE TABLE IF NOT EXISTS settings(
        user_id TEXT PRIMARY KEY,
        payment_day INTEGER NOT NULL DEFAULT 1 CHECK(payment_day BETWEEN 1 AND 28),
        account_balance TEXT NOT NULL DEFAULT '0',
        version INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS transactions(
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        description TEXT NOT NULL,
        amount TEXT NOT NULL,
        category TEXT NOT NULL,
        kind TEXT NOT NULL CHECK(kind IN ('income','expense')),
        created_at TEXT NOT NULL,
        due_date TEXT,
        is_paid INTEGER NOT NULL DEFAULT 0,
        is_recurring INTEGER NOT NULL DEFAULT 0,
        is_installment INTEGER NOT NULL DEFAULT 0,
        installment_group_id TEXT,
        template_id TEXT,
        occurrence_date TEXT,
        UNIQUE(template_id, occurrence_date)
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id, due_date);

    CREATE TABLE IF NOT EXISTS budgets(
        user_id TEXT NOT NULL,
        category TEXT NOT NULL,
        amount TEXT NOT NULL,
        PRIMARY KEY(user_id, category)
    );

    CREATE TABLE IF NOT EXISTS credit_cards(
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        limit_amount TEXT NOT NULL,
        statement_day INTEGER NOT NULL,
        payment_due_day INTEGER NOT NULL,
        UNIQUE(user_id, name)
    );

    CREATE TABLE IF NOT EXISTS card_debts(
        id TEXT PRIMARY KEY,
        card_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        description TEXT NOT NULL,
        amount TEXT NOT NULL,
        category TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY(card_id) REFERENCES credit_cards(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_card_debts_card ON card_debts(card_id, created_at);

    CREATE TABLE IF NOT EXISTS card_payments(
        id TEXT PRIMARY KEY,
        card_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        description TEXT NOT NULL,
        amount TEXT NOT NULL,
        paid_at TEXT NOT NULL,
        is_partial INTEGER NOT NULL,
        FOREIGN KEY(card_id) REFERENCES credit_cards(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS goals(
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        target_amount TEXT NOT NULL,
        current_amount TEXT NOT NULL DEFAULT '0',
        target_date TEXT
    );

    CREATE TABLE IF NOT EXISTS savings_history(
        id TEXT PRIMARY KEY,
        goal_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        amount TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS investments(
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        asset_name TEXT NOT NULL,
        asset_type TEXT NOT NULL,
        quantity TEXT NOT NULL,
        purchase_price TEXT NOT NULL,
        current_price TEXT NOT NULL,
        symbol TEXT,
        price_provider TEXT NOT NULL,
        auto_update INTEGER NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS trades(
        id TEXT PRIMARY KEY,
        investment_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        side TEXT NOT NULL CHECK(side IN ('buy','sell')),
        quantity TEXT NOT NULL,
        price TEXT NOT NULL,
        executed_at TEXT NOT NULL,
        realized_pnl TEXT NOT NULL DEFAULT '0'
    );
    CREATE INDEX IF NOT EXISTS idx_trades_investment ON trades(investment_id, executed_at);

    CREATE TABLE IF NOT EXISTS price_cache(
        cache_key TEXT PRIMARY KEY,
        price TEXT NOT NULL,
        fetched_at TEXT NOT NULL
    );
    "#,
    )?;
    Ok(())
}

pub fn format_instant(at: &Instant) -> String {
    at.to_rfc3339()
}

/// Parses every timestamp encoding found in stored data: RFC 3339,
/// `YYYY-MM-DD` (midnight UTC) and epoch milliseconds.
pub fn parse_instant(raw: &str) -> LedgerResult<Instant> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }
    if let Ok(ms) = raw.parse::<i64>() {
        if let Some(dt) = Utc.timestamp_millis_opt(ms).single() {
            return Ok(dt);
        }
    }
    Err(LedgerError::Corrupt(format!("timestamp '{raw}'")))
}

pub fn format_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn parse_stored_date(raw: &str) -> LedgerResult<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        return Ok(d);
    }
    parse_instant(raw).map(|dt| dt.date_naive())
}

pub fn parse_stored_decimal(raw: &str, what: &str) -> LedgerResult<Decimal> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|_| LedgerError::Corrupt(format!("{what} '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn legacy_timestamp_encodings_normalize() {
        let a = parse_instant("2024-03-05T10:00:00+03:00").unwrap();
        assert_eq!(a.to_rfc3339(), "2024-03-05T07:00:00+00:00");
        let b = parse_instant("2024-03-05").unwrap();
        assert_eq!(b.day(), 5);
        let c = parse_instant("1709622000000").unwrap();
        assert_eq!(c, a);
        assert!(parse_instant("yesterday").is_err());
    }

    #[test]
    fn schema_is_idempotent() {
        let mut conn = open_in_memory().unwrap();
        init_schema(&mut conn).unwrap();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='settings'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(n, 1);
    }
}
