// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Spot prices in the reporting currency.
//!
//! Lookups go memory cache, then the `price_cache` table, then the provider
//! chain. A quote younger than the TTL never touches the network. When every
//! provider step fails the last known quote comes back flagged `stale`; with
//! nothing cached the answer is "no price".

pub mod cache;
pub mod providers;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, Endpoints, Policy};
use crate::models::{Instant, PriceProvider};
use crate::utils::http_client;
use cache::{MemoryCache, cache_key};
use providers::Fetcher;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub price: Decimal,
    pub fetched_at: Instant,
    /// Served from cache after every provider step failed.
    pub stale: bool,
}

/// The network boundary: GET a URL, decode the body as JSON.
pub trait QuoteSource: Send + Sync {
    fn fetch_json(&self, url: &str) -> Result<serde_json::Value>;
}

pub struct HttpQuoteSource {
    client: reqwest::blocking::Client,
}

impl HttpQuoteSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

impl QuoteSource for HttpQuoteSource {
    fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?;
        if !resp.status().is_success() {
            return Err(anyhow!("GET {url}: HTTP {}", resp.status()));
        }
        resp.json().with_context(|| format!("Invalid JSON from {url}"))
    }
}

pub struct PriceResolver {
    source: Box<dyn QuoteSource>,
    endpoints: Endpoints,
    policy: Policy,
    reporting_currency: String,
    memory: MemoryCache,
}

impl PriceResolver {
    pub fn new(source: Box<dyn QuoteSource>, cfg: &AppConfig, reporting_currency: &str) -> Self {
        Self {
            source,
            endpoints: cfg.endpoints.clone(),
            policy: cfg.policy.clone(),
            reporting_currency: reporting_currency.trim().to_ascii_uppercase(),
            memory: MemoryCache::default(),
        }
    }

    /// Resolver backed by live HTTP with the configured timeout.
    pub fn http(cfg: &AppConfig, reporting_currency: &str) -> Result<Self> {
        let source = HttpQuoteSource::new(cfg.policy.fetch_timeout())?;
        Ok(Self::new(Box::new(source), cfg, reporting_currency))
    }

    pub fn reporting_currency(&self) -> &str {
        &self.reporting_currency
    }

    pub fn resolve(&self, conn: &Connection, provider: PriceProvider, symbol: &str) -> Option<Quote> {
        self.resolve_at(conn, provider, symbol, Utc::now())
    }

    pub fn resolve_at(
        &self,
        conn: &Connection,
        provider: PriceProvider,
        symbol: &str,
        now: Instant,
    ) -> Option<Quote> {
        if provider == PriceProvider::Manual || symbol.trim().is_empty() {
            return None;
        }
        let key = cache_key(provider, symbol);
        let fresh = |q: &Quote| now - q.fetched_at < self.policy.cache_ttl();

        let remembered = self.memory.get(&key);
        if let Some(q) = remembered.as_ref().filter(|q| fresh(*q)) {
            debug!(%key, "price cache hit (memory)");
            return Some(q.clone());
        }
        let durable = match cache::load(conn, &key) {
            Ok(q) => q,
            Err(e) => {
                warn!(%key, error = %e, "price cache unreadable");
                None
            }
        };
        if let Some(q) = durable.as_ref().filter(|q| fresh(*q)) {
            debug!(%key, "price cache hit (store)");
            self.memory.put(&key, q);
            return Some(q.clone());
        }

        match self.fetch(provider, symbol) {
            Ok(price) => {
                let quote = Quote {
                    price,
                    fetched_at: now,
                    stale: false,
                };
                self.memory.put(&key, &quote);
                if let Err(e) = cache::store(conn, &key, price, now) {
                    warn!(%key, error = %e, "could not persist quote");
                }
                info!(%key, %price, currency = %self.reporting_currency, "price resolved");
                Some(quote)
            }
            Err(e) => {
                let last = [remembered, durable]
                    .into_iter()
                    .flatten()
                    .max_by_key(|q| q.fetched_at);
                match last {
                    Some(q) => {
                        warn!(%key, error = %e, fetched_at = %q.fetched_at, "providers failed; serving stale quote");
                        Some(Quote { stale: true, ..q })
                    }
                    None => {
                        warn!(%key, error = %e, "no price available");
                        None
                    }
                }
            }
        }
    }

    fn fetch(&self, provider: PriceProvider, symbol: &str) -> Result<Decimal> {
        let fetcher = Fetcher {
            source: self.source.as_ref(),
            endpoints: &self.endpoints,
            policy: &self.policy,
            reporting: &self.reporting_currency,
        };
        match provider {
            PriceProvider::Crypto => fetcher.crypto(symbol),
            PriceProvider::Forex => fetcher.forex(symbol),
            PriceProvider::Metals => fetcher.metals(symbol),
            PriceProvider::Manual => Err(anyhow!("manual positions are never fetched")),
        }
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Answers from a URL-substring table; unmatched URLs fail.
    #[derive(Clone, Default)]
    pub struct StubSource {
        pub routes: Arc<Mutex<HashMap<String, serde_json::Value>>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl StubSource {
        pub fn route(&self, fragment: &str, body: serde_json::Value) {
            self.routes.lock().unwrap().insert(fragment.to_string(), body);
        }

        pub fn clear(&self) {
            self.routes.lock().unwrap().clear();
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl QuoteSource for StubSource {
        fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let routes = self.routes.lock().unwrap();
            routes
                .iter()
                .find(|(fragment, _)| url.contains(fragment.as_str()))
                .map(|(_, body)| body.clone())
                .ok_or_else(|| anyhow!("offline: {url}"))
        }
    }
}
