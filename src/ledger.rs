// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! The account balance and the only code path allowed to change it.
//!
//! A commit reads the settings row, asks a planner for a [`Mutation`]
//! computed from that snapshot, then writes the new balance and every
//! justifying record inside one SQLite transaction. The balance update is
//! guarded by the row's `version`; a conflict or a busy store replays the
//! whole plan.

use rusqlite::{Connection, TransactionBehavior, params};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{format_date, format_instant};
use crate::errors::{LedgerError, LedgerResult, in_range};
use crate::models::{Instant, Investment, PaymentHistoryEntry, SavingsEntry, Settings, Trade, Transaction};
use crate::store;

/// A record change that justifies a balance movement.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    InsertTransaction(Transaction),
    MarkPaid { transaction_id: String },
    DeleteTransaction { transaction_id: String },
    SetGoalAmount { goal_id: String, amount: Decimal },
    AppendSavings(SavingsEntry),
    DeleteGoal { goal_id: String },
    InsertPosition(Investment),
    UpdatePosition {
        investment_id: String,
        quantity: Decimal,
        purchase_price: Decimal,
        updated_at: Instant,
    },
    DeletePosition { investment_id: String },
    AppendTrade(Trade),
    SetDebtAmount { debt_id: String, amount: Decimal },
    DeleteDebt { debt_id: String },
    AppendPayment(PaymentHistoryEntry),
}

/// What a planner wants committed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mutation {
    pub delta: Decimal,
    /// Reject the commit when the balance would drop below zero.
    pub requires_funds: bool,
    pub writes: Vec<Write>,
}

impl Mutation {
    pub fn new(delta: Decimal) -> Self {
        Self {
            delta,
            ..Self::default()
        }
    }

    pub fn funded(mut self) -> Self {
        self.requires_funds = true;
        self
    }

    pub fn with(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub previous_balance: Decimal,
    pub balance: Decimal,
    pub attempts: u32,
}

pub struct BalanceLedger<'a> {
    conn: &'a mut Connection,
    user: &'a str,
    max_attempts: u32,
}

impl<'a> BalanceLedger<'a> {
    pub fn new(conn: &'a mut Connection, user: &'a str, max_attempts: u32) -> Self {
        Self {
            conn,
            user,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Commits a fixed delta with its justifying writes.
    pub fn apply_delta(&mut self, mutation: Mutation) -> LedgerResult<Receipt> {
        self.commit(|_, _| Ok(mutation.clone()))
    }

    /// Plans against a fresh snapshot and commits atomically, replanning on
    /// conflict.
    pub fn commit<F>(&mut self, mut plan: F) -> LedgerResult<Receipt>
    where
        F: FnMut(&Connection, &Settings) -> LedgerResult<Mutation>,
    {
        store::ensure_settings(self.conn, self.user)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_commit(&mut plan) {
                Ok(Some((previous_balance, balance))) => {
                    info!(
                        user = self.user,
                        %previous_balance,
                        %balance,
                        attempt,
                        "ledger commit"
                    );
                    return Ok(Receipt {
                        previous_balance,
                        balance,
                        attempts: attempt,
                    });
                }
                Ok(None) => {
                    debug!(user = self.user, attempt, "balance version moved; replanning");
                }
                Err(e) if e.is_transient() => {
                    debug!(user = self.user, attempt, error = %e, "store busy; replanning");
                }
                Err(e) => return Err(e),
            }
            if attempt >= self.max_attempts {
                warn!(user = self.user, attempts = attempt, "ledger commit abandoned");
                return Err(LedgerError::ConcurrencyConflict { attempts: attempt });
            }
        }
    }

    /// `Ok(None)` means the optimistic version check lost; nothing was kept.
    fn try_commit<F>(&mut self, plan: &mut F) -> LedgerResult<Option<(Decimal, Decimal)>>
    where
        F: FnMut(&Connection, &Settings) -> LedgerResult<Mutation>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)?;
        let settings = store::read_settings(&tx, self.user)?;
        let mutation = plan(&tx, &settings)?;

        let previous = settings.account_balance;
        let next = in_range(previous.checked_add(mutation.delta))?;
        if mutation.requires_funds && mutation.delta < Decimal::ZERO && next < Decimal::ZERO {
            return Err(LedgerError::InsufficientFunds {
                balance: previous,
                required: -mutation.delta,
            });
        }

        for write in &mutation.writes {
            debug!(user = self.user, write = %describe(write), "apply");
            apply_write(&tx, self.user, write)?;
        }

        let n = tx.execute(
            "UPDATE settings SET account_balance=?1, version=version+1
             WHERE user_id=?2 AND version=?3",
            params![next.to_string(), self.user, settings.version],
        )?;
        if n == 0 {
            return Ok(None);
        }
        tx.commit()?;
        Ok(Some((previous, next)))
    }
}

fn expect_one(n: usize, kind: &'static str, id: &str) -> LedgerResult<()> {
    if n == 1 {
        Ok(())
    } else {
        Err(LedgerError::not_found(kind, id))
    }
}

fn apply_write(conn: &Connection, user: &str, write: &Write) -> LedgerResult<()> {
    match write {
        Write::InsertTransaction(t) => store::insert_transaction(conn, user, t),
        Write::MarkPaid { transaction_id } => {
            let n = conn.execute(
                "UPDATE transactions SET is_paid=1
                 WHERE user_id=?1 AND id=?2 AND is_paid=0 AND is_recurring=0",
                params![user, transaction_id],
            )?;
            expect_one(n, "unpaid transaction", transaction_id)
        }
        Write::DeleteTransaction { transaction_id } => {
            let n = conn.execute(
                "DELETE FROM transactions WHERE user_id=?1 AND id=?2",
                params![user, transaction_id],
            )?;
            expect_one(n, "transaction", transaction_id)
        }
        Write::SetGoalAmount { goal_id, amount } => {
            let n = conn.execute(
                "UPDATE goals SET current_amount=?1 WHERE user_id=?2 AND id=?3",
                params![amount.to_string(), user, goal_id],
            )?;
            expect_one(n, "goal", goal_id)
        }
        Write::AppendSavings(entry) => {
            conn.execute(
                "INSERT INTO savings_history(id, goal_id, user_id, amount, created_at)
                 VALUES (?1,?2,?3,?4,?5)",
                params![
                    entry.id,
                    entry.goal_id,
                    user,
                    entry.amount.to_string(),
                    format_instant(&entry.created_at)
                ],
            )?;
            Ok(())
        }
        Write::DeleteGoal { goal_id } => {
            conn.execute(
                "DELETE FROM savings_history WHERE user_id=?1 AND goal_id=?2",
                params![user, goal_id],
            )?;
            let n = conn.execute(
                "DELETE FROM goals WHERE user_id=?1 AND id=?2",
                params![user, goal_id],
            )?;
            expect_one(n, "goal", goal_id)
        }
        Write::InsertPosition(inv) => store::insert_investment(conn, user, inv),
        Write::UpdatePosition {
            investment_id,
            quantity,
            purchase_price,
            updated_at,
        } => {
            let n = conn.execute(
                "UPDATE investments SET quantity=?1, purchase_price=?2, updated_at=?3
                 WHERE user_id=?4 AND id=?5",
                params![
                    quantity.to_string(),
                    purchase_price.to_string(),
                    format_instant(updated_at),
                    user,
                    investment_id
                ],
            )?;
            expect_one(n, "investment", investment_id)
        }
        Write::DeletePosition { investment_id } => {
            let n = conn.execute(
                "DELETE FROM investments WHERE user_id=?1 AND id=?2",
                params![user, investment_id],
            )?;
            expect_one(n, "investment", investment_id)
        }
        Write::AppendTrade(trade) => {
            conn.execute(
                "INSERT INTO trades(id, investment_id, user_id, side, quantity, price, executed_at,
                     realized_pnl)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
                params![
                    trade.id,
                    trade.investment_id,
                    user,
                    trade.side.as_str(),
                    trade.quantity.to_string(),
                    trade.price.to_string(),
                    format_instant(&trade.executed_at),
                    trade.realized_pnl.to_string()
                ],
            )?;
            Ok(())
        }
        Write::SetDebtAmount { debt_id, amount } => {
            let n = conn.execute(
                "UPDATE card_debts SET amount=?1 WHERE user_id=?2 AND id=?3",
                params![amount.to_string(), user, debt_id],
            )?;
            expect_one(n, "debt", debt_id)
        }
        Write::DeleteDebt { debt_id } => {
            let n = conn.execute(
                "DELETE FROM card_debts WHERE user_id=?1 AND id=?2",
                params![user, debt_id],
            )?;
            expect_one(n, "debt", debt_id)
        }
        Write::AppendPayment(entry) => {
            conn.execute(
                "INSERT INTO card_payments(id, card_id, user_id, description, amount, paid_at,
                     is_partial)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![
                    entry.id,
                    entry.card_id,
                    user,
                    entry.description,
                    entry.amount.to_string(),
                    format_instant(&entry.paid_at),
                    entry.is_partial
                ],
            )?;
            Ok(())
        }
    }
}

/// Stored balance next to the balance implied by the paid history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub stored: Decimal,
    pub replayed: Decimal,
    pub paid_transactions: usize,
}

impl Reconciliation {
    pub fn difference(&self) -> Decimal {
        self.stored - self.replayed
    }

    pub fn is_consistent(&self) -> bool {
        self.difference().is_zero()
    }
}

/// Replays every paid transaction. Each balance movement writes one, so the
/// sum must equal the stored balance.
pub fn reconcile(conn: &Connection, user: &str) -> LedgerResult<Reconciliation> {
    let stored = store::load_settings(conn, user)?.account_balance;
    let mut replayed = Decimal::ZERO;
    let mut paid_transactions = 0;
    for t in store::list_transactions(conn, user)? {
        if t.is_paid && !t.is_recurring {
            replayed += t.signed_amount();
            paid_transactions += 1;
        }
    }
    Ok(Reconciliation {
        stored,
        replayed,
        paid_transactions,
    })
}

/// Human label for a write, used in debug logs.
pub fn describe(write: &Write) -> String {
    match write {
        Write::InsertTransaction(t) => format!(
            "insert {} '{}' {} due {}",
            t.kind,
            t.description,
            t.amount,
            t.due_date.as_ref().map(format_date).unwrap_or_default()
        ),
        Write::MarkPaid { transaction_id } => format!("mark paid {transaction_id}"),
        Write::DeleteTransaction { transaction_id } => format!("delete transaction {transaction_id}"),
        Write::SetGoalAmount { goal_id, amount } => format!("goal {goal_id} = {amount}"),
        Write::AppendSavings(e) => format!("savings +{} to goal {}", e.amount, e.goal_id),
        Write::DeleteGoal { goal_id } => format!("delete goal {goal_id}"),
        Write::InsertPosition(inv) => format!("open {} x {}", inv.asset_name, inv.quantity),
        Write::UpdatePosition {
            investment_id,
            quantity,
            purchase_price,
            ..
        } => format!("position {investment_id} qty {quantity} @ {purchase_price}"),
        Write::DeletePosition { investment_id } => format!("close position {investment_id}"),
        Write::AppendTrade(t) => format!("trade {} {} @ {}", t.side.as_str(), t.quantity, t.price),
        Write::SetDebtAmount { debt_id, amount } => format!("debt {debt_id} = {amount}"),
        Write::DeleteDebt { debt_id } => format!("retire debt {debt_id}"),
        Write::AppendPayment(e) => format!(
            "payment {}{}",
            e.amount,
            if e.is_partial { " (partial)" } else { "" }
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::models::TxKind;
    use chrono::Utc;

    fn paid_income(amount: i64) -> Transaction {
        Transaction {
            id: store::new_id(),
            description: "Salary".into(),
            amount: Decimal::from(amount),
            category: "salary".into(),
            kind: TxKind::Income,
            created_at: Utc::now(),
            due_date: None,
            is_paid: true,
            is_recurring: false,
            is_installment: false,
            installment_group_id: None,
            template_id: None,
            occurrence_date: None,
        }
    }

    #[test]
    fn delta_and_record_commit_together() {
        let mut conn = open_in_memory().unwrap();
        let t = paid_income(1000);
        let receipt = BalanceLedger::new(&mut conn, "u", 3)
            .apply_delta(Mutation::new(Decimal::from(1000)).with(Write::InsertTransaction(t.clone())))
            .unwrap();
        assert_eq!(receipt.balance, Decimal::from(1000));
        assert_eq!(receipt.attempts, 1);
        assert!(store::get_transaction(&conn, "u", &t.id).unwrap().is_paid);
        assert!(reconcile(&conn, "u").unwrap().is_consistent());
    }

    #[test]
    fn failed_write_rolls_back_balance() {
        let mut conn = open_in_memory().unwrap();
        let err = BalanceLedger::new(&mut conn, "u", 3)
            .apply_delta(Mutation::new(Decimal::from(50)).with(Write::MarkPaid {
                transaction_id: "missing".into(),
            }))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
        assert_eq!(store::load_settings(&conn, "u").unwrap().account_balance, Decimal::ZERO);
    }

    #[test]
    fn funded_outflow_is_rejected_without_writes() {
        let mut conn = open_in_memory().unwrap();
        let t = paid_income(10);
        let err = BalanceLedger::new(&mut conn, "u", 3)
            .apply_delta(
                Mutation::new(Decimal::from(-10))
                    .funded()
                    .with(Write::InsertTransaction(t.clone())),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert!(store::list_transactions(&conn, "u").unwrap().is_empty());
    }

    #[test]
    fn unfunded_outflow_may_go_negative() {
        let mut conn = open_in_memory().unwrap();
        let receipt = BalanceLedger::new(&mut conn, "u", 3)
            .apply_delta(Mutation::new(Decimal::from(-25)))
            .unwrap();
        assert_eq!(receipt.balance, Decimal::from(-25));
    }

    #[test]
    fn version_conflict_replans_then_gives_up() {
        let mut conn = open_in_memory().unwrap();
        let mut calls = 0;
        let err = BalanceLedger::new(&mut conn, "u", 3)
            .commit(|c, _| {
                calls += 1;
                // Simulate another writer committing between read and write.
                c.execute("UPDATE settings SET version=version+1 WHERE user_id='u'", [])?;
                Ok(Mutation::new(Decimal::ONE))
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::ConcurrencyConflict { attempts: 3 }));
        assert_eq!(calls, 3);
        assert_eq!(store::load_settings(&conn, "u").unwrap().account_balance, Decimal::ZERO);
    }

    #[test]
    fn planner_sees_latest_balance() {
        let mut conn = open_in_memory().unwrap();
        let mut ledger = BalanceLedger::new(&mut conn, "u", 3);
        ledger.apply_delta(Mutation::new(Decimal::from(40))).unwrap();
        let receipt = ledger
            .commit(|_, s| Ok(Mutation::new(-s.account_balance / Decimal::TWO)))
            .unwrap();
        assert_eq!(receipt.balance, Decimal::from(20));
    }

    #[test]
    fn balance_overflow_is_a_validation_error() {
        let mut conn = open_in_memory().unwrap();
        let mut ledger = BalanceLedger::new(&mut conn, "u", 3);
        ledger.apply_delta(Mutation::new(Decimal::MAX)).unwrap();
        let err = ledger.apply_delta(Mutation::new(Decimal::ONE)).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(store::load_settings(&conn, "u").unwrap().account_balance, Decimal::MAX);
    }

    #[test]
    fn busy_store_replans_and_conserves_balance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paycycle.db");
        let mut conn = crate::db::open_at(&path).unwrap();
        conn.busy_timeout(std::time::Duration::ZERO).unwrap();
        let mut other = crate::db::open_at(&path).unwrap();
        store::ensure_settings(&conn, "u").unwrap();

        let salary = paid_income(100);
        let mut calls = 0;
        let receipt = BalanceLedger::new(&mut conn, "u", 3)
            .commit(|_, _| {
                calls += 1;
                match calls {
                    // Another writer grabs the write lock mid-commit.
                    1 => other.execute_batch("BEGIN IMMEDIATE")?,
                    _ => other.execute_batch("ROLLBACK")?,
                }
                Ok(Mutation::new(Decimal::from(100)).with(Write::InsertTransaction(salary.clone())))
            })
            .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(receipt.attempts, 2);
        assert_eq!(receipt.balance, Decimal::from(100));

        BalanceLedger::new(&mut other, "u", 3)
            .apply_delta(Mutation::new(Decimal::from(50)).with(Write::InsertTransaction(paid_income(50))))
            .unwrap();
        assert_eq!(store::load_settings(&conn, "u").unwrap().account_balance, Decimal::from(150));
        assert_eq!(store::list_transactions(&conn, "u").unwrap().len(), 2);
        assert!(reconcile(&conn, "u").unwrap().is_consistent());
    }
}
