// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Timer-driven background work: recurring materialization and price
//! refresh. The worker owns its own connection and stops on request or drop;
//! a pass that already started runs to completion.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant as Clock};
use tracing::{error, info, warn};

use crate::config::Policy;
use crate::db;
use crate::portfolio::{self, RefreshReport};
use crate::pricing::PriceResolver;
use crate::recurring::{self, MaterializeReport};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    pub materialized: Option<MaterializeReport>,
    pub refreshed: Option<RefreshReport>,
}

pub fn materialize_now(conn: &mut Connection, user: &str) -> Result<MaterializeReport> {
    let now = Utc::now();
    Ok(recurring::materialize(conn, user, now.date_naive(), now)?)
}

pub fn refresh_now(conn: &Connection, user: &str, resolver: &PriceResolver) -> Result<RefreshReport> {
    Ok(portfolio::refresh_prices(conn, user, resolver, Utc::now())?)
}

/// Both jobs back to back; each failure is logged and left for the next
/// pass.
pub fn run_once(conn: &mut Connection, user: &str, resolver: &PriceResolver) -> PassReport {
    let materialized = materialize_now(conn, user)
        .map_err(|e| warn!(user, error = %e, "materialize pass failed"))
        .ok();
    let refreshed = refresh_now(conn, user, resolver)
        .map_err(|e| warn!(user, error = %e, "refresh pass failed"))
        .ok();
    PassReport {
        materialized,
        refreshed,
    }
}

pub struct BackgroundWorker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    pub fn spawn(db_path: PathBuf, user: String, resolver: PriceResolver, policy: &Policy) -> Result<Self> {
        let refresh_every = policy.refresh_interval().max(Duration::from_millis(10));
        let materialize_every = policy.materialize_interval().max(Duration::from_millis(10));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("paycycle-worker".into())
            .spawn(move || {
                let mut conn = match db::open_at(&db_path) {
                    Ok(c) => c,
                    Err(e) => {
                        error!(path = %db_path.display(), error = %e, "worker could not open store");
                        return;
                    }
                };
                info!(%user, ?refresh_every, ?materialize_every, "background worker started");
                let start = Clock::now();
                let mut next_refresh = start;
                let mut next_materialize = start;
                loop {
                    let now = Clock::now();
                    if now >= next_materialize {
                        if let Err(e) = materialize_now(&mut conn, &user) {
                            warn!(%user, error = %e, "materialize pass failed");
                        }
                        next_materialize = now + materialize_every;
                    }
                    if now >= next_refresh {
                        if let Err(e) = refresh_now(&conn, &user, &resolver) {
                            warn!(%user, error = %e, "refresh pass failed");
                        }
                        next_refresh = now + refresh_every;
                    }
                    let wake = next_refresh.min(next_materialize);
                    let wait = wake.saturating_duration_since(Clock::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!(%user, "background worker stopped");
            })
            .context("Failed to spawn background worker")?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signals the worker and waits for the current pass to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("background worker panicked");
            }
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::{NewTransaction, TxKind};
    use crate::pricing::stub::StubSource;
    use crate::store;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn rent() -> NewTransaction {
        NewTransaction {
            description: "Rent".into(),
            amount: Decimal::from(900),
            category: "housing".into(),
            kind: TxKind::Expense,
            due_date: NaiveDate::from_ymd_opt(2024, 1, 5),
            is_paid: false,
        }
    }

    #[test]
    fn worker_materializes_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.sqlite");
        let conn = db::open_at(&path).unwrap();
        let created = Utc::now() - chrono::Duration::days(70);
        recurring::add_recurring(&conn, "u", &rent(), created).unwrap();

        let resolver = PriceResolver::new(Box::new(StubSource::default()), &AppConfig::default(), "TRY");
        let worker = BackgroundWorker::spawn(path.clone(), "u".into(), resolver, &Policy::default()).unwrap();

        let deadline = Clock::now() + Duration::from_secs(5);
        let mut occurrences = 0;
        while Clock::now() < deadline {
            occurrences = store::existing_occurrences(&conn, "u").unwrap().len();
            if occurrences > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(occurrences >= 2);
        assert!(worker.is_running());
        worker.stop();
    }

    #[test]
    fn run_once_is_idempotent() {
        let mut conn = db::open_in_memory().unwrap();
        let created = Utc::now() - chrono::Duration::days(40);
        recurring::add_recurring(&conn, "u", &rent(), created).unwrap();
        let resolver = PriceResolver::new(Box::new(StubSource::default()), &AppConfig::default(), "TRY");

        let first = run_once(&mut conn, "u", &resolver);
        let created_first = first.materialized.unwrap().created;
        assert!(created_first >= 1);
        let second = run_once(&mut conn, "u", &resolver);
        assert_eq!(second.materialized.unwrap().created, 0);
        assert_eq!(second.refreshed.unwrap().checked, 0);
    }
}
