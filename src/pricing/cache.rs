// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::sync::Mutex;

use super::Quote;
use crate::db::{format_instant, parse_instant, parse_stored_decimal};
use crate::errors::LedgerResult;
use crate::models::{Instant, PriceProvider};

pub fn cache_key(provider: PriceProvider, symbol: &str) -> String {
    format!("{}:{}", provider.as_str(), symbol.trim().to_ascii_lowercase())
}

/// Process-local tier in front of the `price_cache` table.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Quote>>,
}

impl MemoryCache {
    pub fn get(&self, key: &str) -> Option<Quote> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn put(&self, key: &str, quote: &Quote) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), quote.clone());
        }
    }
}

pub fn load(conn: &Connection, key: &str) -> LedgerResult<Option<Quote>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT price, fetched_at FROM price_cache WHERE cache_key=?1",
            params![key],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((price, fetched_at)) = row else {
        return Ok(None);
    };
    Ok(Some(Quote {
        price: parse_stored_decimal(&price, "cached price")?,
        fetched_at: parse_instant(&fetched_at)?,
        stale: false,
    }))
}

pub fn store(conn: &Connection, key: &str, price: rust_decimal::Decimal, at: Instant) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO price_cache(cache_key, price, fetched_at) VALUES (?1,?2,?3)
         ON CONFLICT(cache_key) DO UPDATE SET price=excluded.price, fetched_at=excluded.fetched_at",
        params![key, price.to_string(), format_instant(&at)],
    )?;
    Ok(())
}

/// Drops every durable quote, e.g. after the reporting currency changes.
pub fn purge(conn: &Connection) -> LedgerResult<usize> {
    Ok(conn.execute("DELETE FROM price_cache", [])?)
}
