// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Row-level access to the ledger collections. Every query is scoped by
//! `user_id`; nothing here touches `settings.account_balance` (that is the
//! ledger's job).

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};

use crate::cycle::validate_payment_day;
use crate::db::{format_date, format_instant, parse_instant, parse_stored_date};
use crate::errors::{LedgerError, LedgerResult};
use crate::models::{
    CreditCard, Debt, Goal, Instant, Investment, PaymentHistoryEntry, PriceProvider,
    SavingsEntry, Settings, Trade, TradeSide, Transaction, TxKind,
};

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn dec(r: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let s: String = r.get(idx)?;
    s.trim()
        .parse::<Decimal>()
        .map_err(|e| conversion_err(idx, e))
}

fn instant(r: &Row<'_>, idx: usize) -> rusqlite::Result<Instant> {
    let s: String = r.get(idx)?;
    parse_instant(&s).map_err(|e| conversion_err(idx, e))
}

fn date_opt(r: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let s: Option<String> = r.get(idx)?;
    s.map(|s| parse_stored_date(&s).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// Settings

pub fn ensure_settings(conn: &Connection, user: &str) -> LedgerResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO settings(user_id) VALUES (?1)",
        params![user],
    )?;
    Ok(())
}

pub fn load_settings(conn: &Connection, user: &str) -> LedgerResult<Settings> {
    ensure_settings(conn, user)?;
    read_settings(conn, user)
}

/// Reads the settings row without creating it.
pub fn read_settings(conn: &Connection, user: &str) -> LedgerResult<Settings> {
    let s = conn.query_row(
        "SELECT payment_day, account_balance, version FROM settings WHERE user_id=?1",
        params![user],
        |r| {
            Ok(Settings {
                payment_day: r.get(0)?,
                account_balance: dec(r, 1)?,
                version: r.get(2)?,
            })
        },
    )?;
    Ok(s)
}

pub fn set_payment_day(conn: &Connection, user: &str, day: u32) -> LedgerResult<()> {
    validate_payment_day(day)?;
    ensure_settings(conn, user)?;
    conn.execute(
        "UPDATE settings SET payment_day=?1 WHERE user_id=?2",
        params![day, user],
    )?;
    Ok(())
}

// Transactions

const TX_COLUMNS: &str = "id, description, amount, category, kind, created_at, due_date, is_paid, \
     is_recurring, is_installment, installment_group_id, template_id, occurrence_date";

fn tx_from_row(r: &Row<'_>) -> rusqlite::Result<Transaction> {
    let kind: String = r.get(4)?;
    Ok(Transaction {
        id: r.get(0)?,
        description: r.get(1)?,
        amount: dec(r, 2)?,
        category: r.get(3)?,
        kind: kind.parse::<TxKind>().map_err(|e| conversion_err(4, e))?,
        created_at: instant(r, 5)?,
        due_date: date_opt(r, 6)?,
        is_paid: r.get(7)?,
        is_recurring: r.get(8)?,
        is_installment: r.get(9)?,
        installment_group_id: r.get(10)?,
        template_id: r.get(11)?,
        occurrence_date: date_opt(r, 12)?,
    })
}

pub fn insert_transaction(conn: &Connection, user: &str, t: &Transaction) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO transactions(id, user_id, description, amount, category, kind, created_at,
             due_date, is_paid, is_recurring, is_installment, installment_group_id, template_id,
             occurrence_date)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
        params![
            t.id,
            user,
            t.description,
            t.amount.to_string(),
            t.category,
            t.kind.as_str(),
            format_instant(&t.created_at),
            t.due_date.as_ref().map(format_date),
            t.is_paid,
            t.is_recurring,
            t.is_installment,
            t.installment_group_id,
            t.template_id,
            t.occurrence_date.as_ref().map(format_date),
        ],
    )?;
    Ok(())
}

/// Inserts a materialized occurrence; returns false when one already exists
/// for the same `(template_id, occurrence_date)`.
pub fn insert_occurrence(conn: &Connection, user: &str, t: &Transaction) -> LedgerResult<bool> {
    let n = conn.execute(
        "INSERT OR IGNORE INTO transactions(id, user_id, description, amount, category, kind,
             created_at, due_date, is_paid, is_recurring, is_installment, installment_group_id,
             template_id, occurrence_date)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
        params![
            t.id,
            user,
            t.description,
            t.amount.to_string(),
            t.category,
            t.kind.as_str(),
            format_instant(&t.created_at),
            t.due_date.as_ref().map(format_date),
            t.is_paid,
            t.is_recurring,
            t.is_installment,
            t.installment_group_id,
            t.template_id,
            t.occurrence_date.as_ref().map(format_date),
        ],
    )?;
    Ok(n == 1)
}

pub fn get_transaction(conn: &Connection, user: &str, id: &str) -> LedgerResult<Transaction> {
    let sql = format!("SELECT {TX_COLUMNS} FROM transactions WHERE user_id=?1 AND id=?2");
    conn.query_row(&sql, params![user, id], tx_from_row)
        .optional()?
        .ok_or_else(|| LedgerError::not_found("transaction", id))
}

/// Every transaction of the user (templates included), oldest first.
pub fn list_transactions(conn: &Connection, user: &str) -> LedgerResult<Vec<Transaction>> {
    let sql = format!(
        "SELECT {TX_COLUMNS} FROM transactions WHERE user_id=?1
         ORDER BY COALESCE(due_date, substr(created_at,1,10)), created_at, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user], tx_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn list_templates(conn: &Connection, user: &str) -> LedgerResult<Vec<Transaction>> {
    Ok(list_transactions(conn, user)?
        .into_iter()
        .filter(|t| t.is_recurring)
        .collect())
}

pub fn existing_occurrences(
    conn: &Connection,
    user: &str,
) -> LedgerResult<HashSet<(String, NaiveDate)>> {
    let mut stmt = conn.prepare(
        "SELECT template_id, occurrence_date FROM transactions
         WHERE user_id=?1 AND template_id IS NOT NULL AND occurrence_date IS NOT NULL",
    )?;
    let rows = stmt.query_map(params![user], |r| {
        let template: String = r.get(0)?;
        let date = date_opt(r, 1)?;
        Ok((template, date))
    })?;
    let mut out = HashSet::new();
    for row in rows {
        if let (template, Some(date)) = row? {
            out.insert((template, date));
        }
    }
    Ok(out)
}

pub fn update_transaction_details(
    conn: &Connection,
    user: &str,
    t: &Transaction,
) -> LedgerResult<()> {
    conn.execute(
        "UPDATE transactions SET description=?1, amount=?2, category=?3, due_date=?4
         WHERE user_id=?5 AND id=?6",
        params![
            t.description,
            t.amount.to_string(),
            t.category,
            t.due_date.as_ref().map(format_date),
            user,
            t.id
        ],
    )?;
    Ok(())
}

pub fn delete_unpaid_transaction(conn: &Connection, user: &str, id: &str) -> LedgerResult<()> {
    let n = conn.execute(
        "DELETE FROM transactions WHERE user_id=?1 AND id=?2 AND is_paid=0",
        params![user, id],
    )?;
    if n == 0 {
        return Err(LedgerError::not_found("unpaid transaction", id));
    }
    Ok(())
}

// Budgets

pub fn set_budget(conn: &Connection, user: &str, category: &str, amount: Decimal) -> LedgerResult<()> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::validation("budget ceiling cannot be negative"));
    }
    conn.execute(
        "INSERT INTO budgets(user_id, category, amount) VALUES (?1,?2,?3)
         ON CONFLICT(user_id, category) DO UPDATE SET amount=excluded.amount",
        params![user, category, amount.to_string()],
    )?;
    Ok(())
}

pub fn list_budgets(conn: &Connection, user: &str) -> LedgerResult<BTreeMap<String, Decimal>> {
    let mut stmt = conn.prepare("SELECT category, amount FROM budgets WHERE user_id=?1")?;
    let rows = stmt.query_map(params![user], |r| Ok((r.get::<_, String>(0)?, dec(r, 1)?)))?;
    let mut out = BTreeMap::new();
    for row in rows {
        let (category, amount) = row?;
        out.insert(category, amount);
    }
    Ok(out)
}

// Credit cards

fn card_from_row(r: &Row<'_>) -> rusqlite::Result<CreditCard> {
    Ok(CreditCard {
        id: r.get(0)?,
        name: r.get(1)?,
        limit: dec(r, 2)?,
        statement_day: r.get(3)?,
        payment_due_day: r.get(4)?,
    })
}

pub fn insert_card(conn: &Connection, user: &str, card: &CreditCard) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO credit_cards(id, user_id, name, limit_amount, statement_day, payment_due_day)
         VALUES (?1,?2,?3,?4,?5,?6)",
        params![
            card.id,
            user,
            card.name,
            card.limit.to_string(),
            card.statement_day,
            card.payment_due_day
        ],
    )?;
    Ok(())
}

/// Looks a card up by id, then by name.
pub fn find_card(conn: &Connection, user: &str, key: &str) -> LedgerResult<CreditCard> {
    conn.query_row(
        "SELECT id, name, limit_amount, statement_day, payment_due_day FROM credit_cards
         WHERE user_id=?1 AND (id=?2 OR name=?2) ORDER BY id=?2 DESC LIMIT 1",
        params![user, key],
        card_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("card", key))
}

pub fn list_cards(conn: &Connection, user: &str) -> LedgerResult<Vec<CreditCard>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, limit_amount, statement_day, payment_due_day FROM credit_cards
         WHERE user_id=?1 ORDER BY name",
    )?;
    let rows = stmt.query_map(params![user], card_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn insert_debt(conn: &Connection, user: &str, debt: &Debt) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO card_debts(id, card_id, user_id, description, amount, category, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7)",
        params![
            debt.id,
            debt.card_id,
            user,
            debt.description,
            debt.amount.to_string(),
            debt.category,
            format_instant(&debt.created_at)
        ],
    )?;
    Ok(())
}

/// Outstanding debts of a card, oldest first.
pub fn list_debts(conn: &Connection, user: &str, card_id: &str) -> LedgerResult<Vec<Debt>> {
    let mut stmt = conn.prepare(
        "SELECT id, card_id, description, amount, category, created_at FROM card_debts
         WHERE user_id=?1 AND card_id=?2 ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![user, card_id], |r| {
        Ok(Debt {
            id: r.get(0)?,
            card_id: r.get(1)?,
            description: r.get(2)?,
            amount: dec(r, 3)?,
            category: r.get(4)?,
            created_at: instant(r, 5)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn list_payments(
    conn: &Connection,
    user: &str,
    card_id: &str,
) -> LedgerResult<Vec<PaymentHistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, card_id, description, amount, paid_at, is_partial FROM card_payments
         WHERE user_id=?1 AND card_id=?2 ORDER BY paid_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![user, card_id], |r| {
        Ok(PaymentHistoryEntry {
            id: r.get(0)?,
            card_id: r.get(1)?,
            description: r.get(2)?,
            amount: dec(r, 3)?,
            paid_at: instant(r, 4)?,
            is_partial: r.get(5)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// Goals

fn goal_from_row(r: &Row<'_>) -> rusqlite::Result<Goal> {
    Ok(Goal {
        id: r.get(0)?,
        name: r.get(1)?,
        target_amount: dec(r, 2)?,
        current_amount: dec(r, 3)?,
        target_date: date_opt(r, 4)?,
    })
}

pub fn insert_goal(conn: &Connection, user: &str, goal: &Goal) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO goals(id, user_id, name, target_amount, current_amount, target_date)
         VALUES (?1,?2,?3,?4,?5,?6)",
        params![
            goal.id,
            user,
            goal.name,
            goal.target_amount.to_string(),
            goal.current_amount.to_string(),
            goal.target_date.as_ref().map(format_date)
        ],
    )?;
    Ok(())
}

pub fn get_goal(conn: &Connection, user: &str, key: &str) -> LedgerResult<Goal> {
    conn.query_row(
        "SELECT id, name, target_amount, current_amount, target_date FROM goals
         WHERE user_id=?1 AND (id=?2 OR name=?2) ORDER BY id=?2 DESC LIMIT 1",
        params![user, key],
        goal_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("goal", key))
}

pub fn list_goals(conn: &Connection, user: &str) -> LedgerResult<Vec<Goal>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, target_amount, current_amount, target_date FROM goals
         WHERE user_id=?1 ORDER BY name",
    )?;
    let rows = stmt.query_map(params![user], goal_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn list_savings(conn: &Connection, user: &str, goal_id: &str) -> LedgerResult<Vec<SavingsEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, goal_id, amount, created_at FROM savings_history
         WHERE user_id=?1 AND goal_id=?2 ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![user, goal_id], |r| {
        Ok(SavingsEntry {
            id: r.get(0)?,
            goal_id: r.get(1)?,
            amount: dec(r, 2)?,
            created_at: instant(r, 3)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// Investments

const INV_COLUMNS: &str = "id, asset_name, asset_type, quantity, purchase_price, current_price, \
     symbol, price_provider, auto_update, updated_at";

fn investment_from_row(r: &Row<'_>) -> rusqlite::Result<Investment> {
    let provider: String = r.get(7)?;
    Ok(Investment {
        id: r.get(0)?,
        asset_name: r.get(1)?,
        asset_type: r.get(2)?,
        quantity: dec(r, 3)?,
        purchase_price: dec(r, 4)?,
        current_price: dec(r, 5)?,
        symbol: r.get(6)?,
        price_provider: provider
            .parse::<PriceProvider>()
            .map_err(|e| conversion_err(7, e))?,
        auto_update: r.get(8)?,
        updated_at: instant(r, 9)?,
    })
}

pub fn insert_investment(conn: &Connection, user: &str, inv: &Investment) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO investments(id, user_id, asset_name, asset_type, quantity, purchase_price,
             current_price, symbol, price_provider, auto_update, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
        params![
            inv.id,
            user,
            inv.asset_name,
            inv.asset_type,
            inv.quantity.to_string(),
            inv.purchase_price.to_string(),
            inv.current_price.to_string(),
            inv.symbol,
            inv.price_provider.as_str(),
            inv.auto_update,
            format_instant(&inv.updated_at)
        ],
    )?;
    Ok(())
}

pub fn get_investment(conn: &Connection, user: &str, id: &str) -> LedgerResult<Investment> {
    let sql = format!("SELECT {INV_COLUMNS} FROM investments WHERE user_id=?1 AND id=?2");
    conn.query_row(&sql, params![user, id], investment_from_row)
        .optional()?
        .ok_or_else(|| LedgerError::not_found("investment", id))
}

pub fn find_position(
    conn: &Connection,
    user: &str,
    provider: PriceProvider,
    symbol: &str,
) -> LedgerResult<Option<Investment>> {
    let sql = format!(
        "SELECT {INV_COLUMNS} FROM investments
         WHERE user_id=?1 AND price_provider=?2 AND symbol=?3 COLLATE NOCASE LIMIT 1"
    );
    Ok(conn
        .query_row(&sql, params![user, provider.as_str(), symbol.trim()], investment_from_row)
        .optional()?)
}

pub fn list_investments(conn: &Connection, user: &str) -> LedgerResult<Vec<Investment>> {
    let sql = format!(
        "SELECT {INV_COLUMNS} FROM investments WHERE user_id=?1 ORDER BY asset_name, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user], investment_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Single-field price update; quantity and balance are never touched here.
pub fn update_current_price(
    conn: &Connection,
    user: &str,
    id: &str,
    price: Decimal,
    at: Instant,
) -> LedgerResult<()> {
    let n = conn.execute(
        "UPDATE investments SET current_price=?1, updated_at=?2 WHERE user_id=?3 AND id=?4",
        params![price.to_string(), format_instant(&at), user, id],
    )?;
    if n == 0 {
        return Err(LedgerError::not_found("investment", id));
    }
    Ok(())
}

pub fn list_trades(conn: &Connection, user: &str) -> LedgerResult<Vec<Trade>> {
    let mut stmt = conn.prepare(
        "SELECT id, investment_id, side, quantity, price, executed_at, realized_pnl FROM trades
         WHERE user_id=?1 ORDER BY executed_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![user], |r| {
        let side: String = r.get(2)?;
        Ok(Trade {
            id: r.get(0)?,
            investment_id: r.get(1)?,
            side: if side == "sell" {
                TradeSide::Sell
            } else {
                TradeSide::Buy
            },
            quantity: dec(r, 3)?,
            price: dec(r, 4)?,
            executed_at: instant(r, 5)?,
            realized_pnl: dec(r, 6)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
