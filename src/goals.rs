// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Savings goals funded from the account balance.

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::errors::{LedgerError, LedgerResult, in_range};
use crate::ledger::{BalanceLedger, Mutation, Receipt, Write};
use crate::models::{Goal, Instant, SavingsEntry, Transaction, TxKind};
use crate::store;

pub const SAVINGS_CATEGORY: &str = "savings";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalProgress {
    pub goal: Goal,
    pub remaining: Decimal,
    /// Percent of the target reached, capped at 100.
    pub percent: Decimal,
}

pub fn progress(goal: &Goal) -> GoalProgress {
    let remaining = (goal.target_amount - goal.current_amount).max(Decimal::ZERO);
    let percent = if goal.target_amount.is_zero() {
        Decimal::ZERO
    } else {
        goal.current_amount
            .checked_div(goal.target_amount)
            .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::ONE_HUNDRED)
            .min(Decimal::ONE_HUNDRED)
            .round_dp(2)
    };
    GoalProgress {
        goal: goal.clone(),
        remaining,
        percent,
    }
}

pub fn create_goal(
    conn: &Connection,
    user: &str,
    name: &str,
    target_amount: Decimal,
    target_date: Option<NaiveDate>,
) -> LedgerResult<Goal> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("goal name is required"));
    }
    if target_amount <= Decimal::ZERO {
        return Err(LedgerError::validation("goal target must be positive"));
    }
    let goal = Goal {
        id: store::new_id(),
        name: name.to_string(),
        target_amount,
        current_amount: Decimal::ZERO,
        target_date,
    };
    store::insert_goal(conn, user, &goal)?;
    Ok(goal)
}

pub fn list_goals(conn: &Connection, user: &str) -> LedgerResult<Vec<GoalProgress>> {
    Ok(store::list_goals(conn, user)?.iter().map(progress).collect())
}

fn savings_transaction(description: String, amount: Decimal, kind: TxKind, now: Instant) -> Transaction {
    Transaction {
        id: store::new_id(),
        description,
        amount,
        category: SAVINGS_CATEGORY.to_string(),
        kind,
        created_at: now,
        due_date: Some(now.date_naive()),
        is_paid: true,
        is_recurring: false,
        is_installment: false,
        installment_group_id: None,
        template_id: None,
        occurrence_date: None,
    }
}

/// Moves `amount` from the balance into a goal. The balance decrease, the
/// goal increase, the savings entry and the expense record commit together.
pub fn transfer_to_goal(
    conn: &mut Connection,
    user: &str,
    goal_key: &str,
    amount: Decimal,
    now: Instant,
    max_attempts: u32,
) -> LedgerResult<Receipt> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::validation("transfer amount must be positive"));
    }
    let goal_id = store::get_goal(conn, user, goal_key)?.id;
    let receipt = BalanceLedger::new(conn, user, max_attempts).commit(|c, _| {
        let goal = store::get_goal(c, user, &goal_id)?;
        let saved = in_range(goal.current_amount.checked_add(amount))?;
        let record = savings_transaction(
            format!("Transfer to goal: {}", goal.name),
            amount,
            TxKind::Expense,
            now,
        );
        Ok(Mutation::new(-amount)
            .funded()
            .with(Write::InsertTransaction(record))
            .with(Write::AppendSavings(SavingsEntry {
                id: store::new_id(),
                goal_id: goal.id.clone(),
                amount,
                created_at: now,
            }))
            .with(Write::SetGoalAmount {
                goal_id: goal.id,
                amount: saved,
            }))
    })?;
    info!(user, goal = %goal_id, %amount, "goal funded");
    Ok(receipt)
}

/// Deletes a goal and refunds whatever it holds back to the balance.
pub fn delete_goal(
    conn: &mut Connection,
    user: &str,
    goal_key: &str,
    now: Instant,
    max_attempts: u32,
) -> LedgerResult<Receipt> {
    let goal_id = store::get_goal(conn, user, goal_key)?.id;
    let receipt = BalanceLedger::new(conn, user, max_attempts).commit(|c, _| {
        let goal = store::get_goal(c, user, &goal_id)?;
        let mut mutation = Mutation::new(goal.current_amount);
        if goal.current_amount > Decimal::ZERO {
            mutation = mutation.with(Write::InsertTransaction(savings_transaction(
                format!("Refund from goal: {}", goal.name),
                goal.current_amount,
                TxKind::Income,
                now,
            )));
        }
        Ok(mutation.with(Write::DeleteGoal { goal_id: goal.id }))
    })?;
    info!(user, goal = %goal_id, refunded = %(receipt.balance - receipt.previous_balance), "goal deleted");
    Ok(receipt)
}
