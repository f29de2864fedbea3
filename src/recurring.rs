// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Recurring templates and installment plans.
//!
//! A template repeats on its due day every month. Occurrences are keyed by
//! `(template_id, occurrence_date)`, so a pass over the same snapshot never
//! creates anything twice.

use chrono::{Datelike, Months, NaiveDate};
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::errors::{LedgerError, LedgerResult};
use crate::models::{Instant, NewTransaction, Transaction, TxKind};
use crate::store;

/// Upper bound on occurrences created for one template in one pass.
pub const MAX_OCCURRENCES_PER_PASS: usize = 240;

fn day_in_month(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    (1..=day)
        .rev()
        .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
}

fn next_month(date: NaiveDate) -> Option<(i32, u32)> {
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    Some((next.year(), next.month()))
}

/// Every occurrence date of a monthly template on `due_day`, strictly after
/// `created` and no later than `today`, oldest first.
fn schedule(due_day: u32, created: NaiveDate, today: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let advance = move |date: &NaiveDate| {
        let (y, m) = next_month(*date)?;
        day_in_month(y, m, due_day)
    };
    let first = day_in_month(created.year(), created.month(), due_day)
        .and_then(|d| if d <= created { advance(&d) } else { Some(d) });
    std::iter::successors(first, move |d| advance(d)).take_while(move |d| *d <= today)
}

/// Occurrence dates of a monthly template on `due_day`, strictly after
/// `created` and no later than `today`, capped at one pass worth.
pub fn occurrence_dates(due_day: u32, created: NaiveDate, today: NaiveDate) -> Vec<NaiveDate> {
    schedule(due_day, created, today)
        .take(MAX_OCCURRENCES_PER_PASS)
        .collect()
}

/// Builds the concrete transactions a pass should create, skipping
/// occurrences already present in `existing`. The per-pass cap counts
/// missing occurrences only, so a long backlog drains over several passes.
pub fn plan_occurrences(
    templates: &[Transaction],
    existing: &HashSet<(String, NaiveDate)>,
    today: NaiveDate,
    now: Instant,
) -> Vec<Transaction> {
    let mut out = Vec::new();
    for template in templates.iter().filter(|t| t.is_recurring) {
        let Some(due) = template.due_date else {
            continue;
        };
        let missing = schedule(due.day(), template.created_at.date_naive(), today)
            .filter(|date| !existing.contains(&(template.id.clone(), *date)))
            .take(MAX_OCCURRENCES_PER_PASS);
        for date in missing {
            out.push(Transaction {
                id: store::new_id(),
                description: template.description.clone(),
                amount: template.amount,
                category: template.category.clone(),
                kind: template.kind,
                created_at: now,
                due_date: Some(date),
                is_paid: false,
                is_recurring: false,
                is_installment: false,
                installment_group_id: None,
                template_id: Some(template.id.clone()),
                occurrence_date: Some(date),
            });
        }
    }
    out
}

fn insert_batch(conn: &mut Connection, user: &str, pending: &[Transaction]) -> LedgerResult<usize> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut created = 0;
    for t in pending {
        if store::insert_occurrence(&tx, user, t)? {
            created += 1;
        }
    }
    tx.commit()?;
    Ok(created)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaterializeReport {
    pub templates: usize,
    pub created: usize,
}

/// One materialization pass; all creations go in a single batch.
pub fn materialize(
    conn: &mut Connection,
    user: &str,
    today: NaiveDate,
    now: Instant,
) -> LedgerResult<MaterializeReport> {
    let templates = store::list_templates(conn, user)?;
    let existing = store::existing_occurrences(conn, user)?;
    let pending = plan_occurrences(&templates, &existing, today, now);
    if pending.is_empty() {
        return Ok(MaterializeReport {
            templates: templates.len(),
            created: 0,
        });
    }

    match insert_batch(conn, user, &pending) {
        Ok(created) => {
            info!(user, created, templates = templates.len(), "recurring occurrences materialized");
            Ok(MaterializeReport {
                templates: templates.len(),
                created,
            })
        }
        Err(e) => {
            warn!(user, error = %e, "materialization batch failed; will retry next pass");
            Err(e)
        }
    }
}

fn validate_new(input: &NewTransaction) -> LedgerResult<()> {
    if input.description.trim().is_empty() {
        return Err(LedgerError::validation("description is required"));
    }
    if input.amount <= Decimal::ZERO {
        return Err(LedgerError::validation("amount must be positive"));
    }
    Ok(())
}

/// Stores a recurring template. Templates never move the balance.
pub fn add_recurring(
    conn: &Connection,
    user: &str,
    input: &NewTransaction,
    now: Instant,
) -> LedgerResult<Transaction> {
    validate_new(input)?;
    if input.due_date.is_none() {
        return Err(LedgerError::validation("a recurring template needs a due date"));
    }
    let template = Transaction {
        id: store::new_id(),
        description: input.description.trim().to_string(),
        amount: input.amount,
        category: input.category.trim().to_string(),
        kind: input.kind,
        created_at: now,
        due_date: input.due_date,
        is_paid: false,
        is_recurring: true,
        is_installment: false,
        installment_group_id: None,
        template_id: None,
        occurrence_date: None,
    };
    store::insert_transaction(conn, user, &template)?;
    Ok(template)
}

/// Splits `total` into `count` monthly installments starting on `start`.
/// Amounts are rounded to cents and the last one absorbs the remainder.
pub fn plan_installments(
    description: &str,
    total: Decimal,
    count: u32,
    start: NaiveDate,
    category: &str,
    kind: TxKind,
    now: Instant,
) -> LedgerResult<Vec<Transaction>> {
    if total <= Decimal::ZERO {
        return Err(LedgerError::validation("installment total must be positive"));
    }
    if count == 0 {
        return Err(LedgerError::validation("installment count must be at least 1"));
    }
    let share = (total / Decimal::from(count)).round_dp(2);
    let group = store::new_id();
    let mut out = Vec::with_capacity(count as usize);
    let mut allocated = Decimal::ZERO;
    for i in 0..count {
        let due = start
            .checked_add_months(Months::new(i))
            .ok_or_else(|| LedgerError::validation("installment date out of range"))?;
        let amount = if i + 1 == count {
            total - allocated
        } else {
            share
        };
        if amount <= Decimal::ZERO {
            return Err(LedgerError::validation(
                "installment total too small for that many installments",
            ));
        }
        allocated += amount;
        out.push(Transaction {
            id: store::new_id(),
            description: format!("{} ({}/{})", description.trim(), i + 1, count),
            amount,
            category: category.trim().to_string(),
            kind,
            created_at: now,
            due_date: Some(due),
            is_paid: false,
            is_recurring: false,
            is_installment: true,
            installment_group_id: Some(group.clone()),
            template_id: None,
            occurrence_date: None,
        });
    }
    Ok(out)
}

/// Persists an installment plan in one batch.
pub fn split_installment(
    conn: &mut Connection,
    user: &str,
    description: &str,
    total: Decimal,
    count: u32,
    start: NaiveDate,
    category: &str,
    now: Instant,
) -> LedgerResult<Vec<Transaction>> {
    if description.trim().is_empty() {
        return Err(LedgerError::validation("description is required"));
    }
    let items = plan_installments(description, total, count, start, category, TxKind::Expense, now)?;
    let tx = conn.transaction()?;
    for t in &items {
        store::insert_transaction(&tx, user, t)?;
    }
    tx.commit()?;
    info!(user, %total, count, "installment plan split");
    Ok(items)
}
