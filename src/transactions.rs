// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! One-off transactions: creation, settlement, edits and balance corrections.

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::info;

use crate::errors::{LedgerError, LedgerResult};
use crate::ledger::{BalanceLedger, Mutation, Receipt, Write};
use crate::models::{Instant, NewTransaction, Transaction, TxKind};
use crate::store;

pub const ADJUSTMENT_CATEGORY: &str = "adjustment";

fn build(input: &NewTransaction, now: Instant) -> LedgerResult<Transaction> {
    if input.description.trim().is_empty() {
        return Err(LedgerError::validation("description is required"));
    }
    if input.amount <= Decimal::ZERO {
        return Err(LedgerError::validation("amount must be positive"));
    }
    Ok(Transaction {
        id: store::new_id(),
        description: input.description.trim().to_string(),
        amount: input.amount,
        category: input.category.trim().to_string(),
        kind: input.kind,
        created_at: now,
        due_date: input.due_date,
        is_paid: input.is_paid,
        is_recurring: false,
        is_installment: false,
        installment_group_id: None,
        template_id: None,
        occurrence_date: None,
    })
}

/// Stores a transaction. A paid one moves the balance in the same commit.
pub fn add_transaction(
    conn: &mut Connection,
    user: &str,
    input: &NewTransaction,
    now: Instant,
    max_attempts: u32,
) -> LedgerResult<(Transaction, Option<Receipt>)> {
    let t = build(input, now)?;
    if !t.is_paid {
        store::insert_transaction(conn, user, &t)?;
        return Ok((t, None));
    }
    let receipt = BalanceLedger::new(conn, user, max_attempts)
        .apply_delta(Mutation::new(t.signed_amount()).with(Write::InsertTransaction(t.clone())))?;
    Ok((t, Some(receipt)))
}

/// Settles an unpaid transaction. The unpaid to paid flip and the balance
/// change are one commit; a second call fails without touching anything.
pub fn pay(
    conn: &mut Connection,
    user: &str,
    transaction_id: &str,
    max_attempts: u32,
) -> LedgerResult<Receipt> {
    let receipt = BalanceLedger::new(conn, user, max_attempts).commit(|c, _| {
        let t = store::get_transaction(c, user, transaction_id)?;
        if t.is_recurring {
            return Err(LedgerError::validation(
                "recurring templates are never paid directly",
            ));
        }
        if t.is_paid {
            return Err(LedgerError::validation(format!(
                "transaction {transaction_id} is already paid"
            )));
        }
        Ok(Mutation::new(t.signed_amount()).with(Write::MarkPaid {
            transaction_id: t.id,
        }))
    })?;
    info!(user, transaction_id, balance = %receipt.balance, "transaction paid");
    Ok(receipt)
}

/// Field changes for an unpaid transaction; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionEdit {
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub due_date: Option<NaiveDate>,
}

pub fn edit_transaction(
    conn: &Connection,
    user: &str,
    transaction_id: &str,
    edit: &TransactionEdit,
) -> LedgerResult<Transaction> {
    let mut t = store::get_transaction(conn, user, transaction_id)?;
    if t.is_paid {
        return Err(LedgerError::validation(
            "a paid transaction cannot be edited; delete it instead",
        ));
    }
    if let Some(d) = &edit.description {
        if d.trim().is_empty() {
            return Err(LedgerError::validation("description is required"));
        }
        t.description = d.trim().to_string();
    }
    if let Some(a) = edit.amount {
        if a <= Decimal::ZERO {
            return Err(LedgerError::validation("amount must be positive"));
        }
        t.amount = a;
    }
    if let Some(c) = &edit.category {
        t.category = c.trim().to_string();
    }
    if edit.due_date.is_some() {
        t.due_date = edit.due_date;
    }
    store::update_transaction_details(conn, user, &t)?;
    Ok(t)
}

/// Deletes a transaction. Deleting a paid one reverses its balance effect.
pub fn delete_transaction(
    conn: &mut Connection,
    user: &str,
    transaction_id: &str,
    max_attempts: u32,
) -> LedgerResult<Option<Receipt>> {
    let t = store::get_transaction(conn, user, transaction_id)?;
    if !t.is_paid {
        store::delete_unpaid_transaction(conn, user, transaction_id)?;
        return Ok(None);
    }
    let receipt = BalanceLedger::new(conn, user, max_attempts).commit(|c, _| {
        let t = store::get_transaction(c, user, transaction_id)?;
        let reversal = if t.is_paid {
            -t.signed_amount()
        } else {
            Decimal::ZERO
        };
        Ok(Mutation::new(reversal).with(Write::DeleteTransaction {
            transaction_id: t.id,
        }))
    })?;
    info!(user, transaction_id, balance = %receipt.balance, "paid transaction reversed");
    Ok(Some(receipt))
}

/// Brings the balance to `target` by recording the difference as a paid
/// adjustment. Returns `None` when the balance already matches.
pub fn adjust_balance(
    conn: &mut Connection,
    user: &str,
    target: Decimal,
    now: Instant,
    max_attempts: u32,
) -> LedgerResult<Option<Receipt>> {
    let mut changed = false;
    let receipt = BalanceLedger::new(conn, user, max_attempts).commit(|_, settings| {
        let diff = target - settings.account_balance;
        changed = !diff.is_zero();
        if diff.is_zero() {
            return Ok(Mutation::default());
        }
        let kind = if diff > Decimal::ZERO {
            TxKind::Income
        } else {
            TxKind::Expense
        };
        let t = Transaction {
            id: store::new_id(),
            description: "Balance adjustment".to_string(),
            amount: diff.abs(),
            category: ADJUSTMENT_CATEGORY.to_string(),
            kind,
            created_at: now,
            due_date: Some(now.date_naive()),
            is_paid: true,
            is_recurring: false,
            is_installment: false,
            installment_group_id: None,
            template_id: None,
            occurrence_date: None,
        };
        Ok(Mutation::new(diff).with(Write::InsertTransaction(t)))
    })?;
    Ok(changed.then_some(receipt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::ledger::reconcile;
    use chrono::Utc;

    fn expense(amount: i64, paid: bool) -> NewTransaction {
        NewTransaction {
            description: "Groceries".into(),
            amount: Decimal::from(amount),
            category: "food".into(),
            kind: TxKind::Expense,
            due_date: None,
            is_paid: paid,
        }
    }

    #[test]
    fn pay_moves_balance_exactly_once() {
        let mut conn = open_in_memory().unwrap();
        let (t, receipt) = add_transaction(&mut conn, "u", &expense(40, false), Utc::now(), 3).unwrap();
        assert!(receipt.is_none());

        let r = pay(&mut conn, "u", &t.id, 3).unwrap();
        assert_eq!(r.balance, Decimal::from(-40));
        assert!(matches!(
            pay(&mut conn, "u", &t.id, 3),
            Err(LedgerError::Validation(_))
        ));
        assert_eq!(store::load_settings(&conn, "u").unwrap().account_balance, Decimal::from(-40));
        assert!(reconcile(&conn, "u").unwrap().is_consistent());
    }

    #[test]
    fn paid_on_creation_commits_with_balance() {
        let mut conn = open_in_memory().unwrap();
        let (_, receipt) = add_transaction(&mut conn, "u", &expense(15, true), Utc::now(), 3).unwrap();
        assert_eq!(receipt.unwrap().balance, Decimal::from(-15));
    }

    #[test]
    fn paid_transactions_are_frozen_but_deletable() {
        let mut conn = open_in_memory().unwrap();
        let (t, _) = add_transaction(&mut conn, "u", &expense(25, true), Utc::now(), 3).unwrap();
        let edit = TransactionEdit {
            amount: Some(Decimal::ONE),
            ..TransactionEdit::default()
        };
        assert!(edit_transaction(&conn, "u", &t.id, &edit).is_err());

        let receipt = delete_transaction(&mut conn, "u", &t.id, 3).unwrap().unwrap();
        assert_eq!(receipt.balance, Decimal::ZERO);
        assert!(store::list_transactions(&conn, "u").unwrap().is_empty());
    }

    #[test]
    fn unpaid_edit_keeps_untouched_fields() {
        let mut conn = open_in_memory().unwrap();
        let (t, _) = add_transaction(&mut conn, "u", &expense(25, false), Utc::now(), 3).unwrap();
        let edit = TransactionEdit {
            category: Some("household".into()),
            ..TransactionEdit::default()
        };
        let updated = edit_transaction(&conn, "u", &t.id, &edit).unwrap();
        assert_eq!(updated.category, "household");
        assert_eq!(updated.amount, Decimal::from(25));
        assert!(delete_transaction(&mut conn, "u", &t.id, 3).unwrap().is_none());
    }

    #[test]
    fn adjustment_is_a_replayable_record() {
        let mut conn = open_in_memory().unwrap();
        let r = adjust_balance(&mut conn, "u", Decimal::new(125050, 2), Utc::now(), 3)
            .unwrap()
            .unwrap();
        assert_eq!(r.balance, Decimal::new(125050, 2));
        assert!(adjust_balance(&mut conn, "u", Decimal::new(125050, 2), Utc::now(), 3)
            .unwrap()
            .is_none());
        let txs = store::list_transactions(&conn, "u").unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].category, ADJUSTMENT_CATEGORY);
        assert!(reconcile(&conn, "u").unwrap().is_consistent());
    }

    #[test]
    fn rejects_non_positive_amounts() {
        let mut conn = open_in_memory().unwrap();
        assert!(add_transaction(&mut conn, "u", &expense(0, false), Utc::now(), 3).is_err());
    }
}
