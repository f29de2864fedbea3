// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Credit cards, their outstanding debts and oldest-first settlement.

use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::config::Policy;
use crate::errors::{LedgerError, LedgerResult};
use crate::ledger::{BalanceLedger, Mutation, Receipt, Write};
use crate::models::{CreditCard, Debt, Instant, PaymentHistoryEntry, Transaction, TxKind};
use crate::store;

pub const CARD_PAYMENT_CATEGORY: &str = "credit_card";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub debt_id: String,
    pub description: String,
    pub applied: Decimal,
    /// What is left on the debt after this payment.
    pub left: Decimal,
}

impl Allocation {
    pub fn retired(&self) -> bool {
        self.left.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementPlan {
    pub allocations: Vec<Allocation>,
    pub remaining: Decimal,
}

/// Spreads `payment` over `debts` (already ordered oldest first). The last
/// debt touched is split when the payment does not cover it.
pub fn allocate_fifo(debts: &[Debt], payment: Decimal) -> LedgerResult<SettlementPlan> {
    if payment <= Decimal::ZERO {
        return Err(LedgerError::validation("payment amount must be positive"));
    }
    if debts.is_empty() {
        return Err(LedgerError::validation("card has no outstanding debt"));
    }
    let mut remaining = payment;
    let mut allocations = Vec::new();
    for debt in debts {
        if remaining.is_zero() {
            break;
        }
        if remaining >= debt.amount {
            remaining -= debt.amount;
            allocations.push(Allocation {
                debt_id: debt.id.clone(),
                description: debt.description.clone(),
                applied: debt.amount,
                left: Decimal::ZERO,
            });
        } else {
            allocations.push(Allocation {
                debt_id: debt.id.clone(),
                description: debt.description.clone(),
                applied: remaining,
                left: debt.amount - remaining,
            });
            remaining = Decimal::ZERO;
        }
    }
    Ok(SettlementPlan {
        allocations,
        remaining,
    })
}

pub fn statement_debt(debts: &[Debt]) -> Decimal {
    debts.iter().map(|d| d.amount).sum()
}

pub fn minimum_payment(statement_debt: Decimal, policy: &Policy) -> Decimal {
    (statement_debt * policy.min_payment_rate).round_dp(2)
}

/// Next date on or after `today` that falls on `day` (clamped to month end).
pub fn next_due_date(day: u32, today: NaiveDate) -> Option<NaiveDate> {
    let in_month = |y: i32, m: u32| {
        (1..=day)
            .rev()
            .find_map(|d| NaiveDate::from_ymd_opt(y, m, d))
    };
    let this = in_month(today.year(), today.month())?;
    if this >= today {
        return Some(this);
    }
    let (y, m) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    in_month(y, m)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardSummary {
    pub card: CreditCard,
    pub statement_debt: Decimal,
    pub minimum_payment: Decimal,
    pub available_limit: Decimal,
    pub next_due: Option<NaiveDate>,
    pub debts: usize,
}

pub fn add_card(
    conn: &Connection,
    user: &str,
    name: &str,
    limit: Decimal,
    statement_day: u32,
    payment_due_day: u32,
) -> LedgerResult<CreditCard> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("card name is required"));
    }
    if limit <= Decimal::ZERO {
        return Err(LedgerError::validation("card limit must be positive"));
    }
    for day in [statement_day, payment_due_day] {
        if !(1..=31).contains(&day) {
            return Err(LedgerError::validation(format!(
                "card day must be between 1 and 31, got {day}"
            )));
        }
    }
    let card = CreditCard {
        id: store::new_id(),
        name: name.to_string(),
        limit,
        statement_day,
        payment_due_day,
    };
    store::insert_card(conn, user, &card)?;
    Ok(card)
}

/// Records a purchase on the card. The balance moves only when the card is
/// paid.
pub fn charge_card(
    conn: &Connection,
    user: &str,
    card_key: &str,
    description: &str,
    amount: Decimal,
    category: &str,
    now: Instant,
) -> LedgerResult<Debt> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::validation("charge amount must be positive"));
    }
    let card = store::find_card(conn, user, card_key)?;
    let debt = Debt {
        id: store::new_id(),
        card_id: card.id,
        description: description.trim().to_string(),
        amount,
        category: category.trim().to_string(),
        created_at: now,
    };
    store::insert_debt(conn, user, &debt)?;
    Ok(debt)
}

pub fn card_summary(
    conn: &Connection,
    user: &str,
    card_key: &str,
    today: NaiveDate,
    policy: &Policy,
) -> LedgerResult<CardSummary> {
    let card = store::find_card(conn, user, card_key)?;
    let debts = store::list_debts(conn, user, &card.id)?;
    let total = statement_debt(&debts);
    Ok(CardSummary {
        statement_debt: total,
        minimum_payment: minimum_payment(total, policy),
        available_limit: card.limit - total,
        next_due: next_due_date(card.payment_due_day, today),
        debts: debts.len(),
        card,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardPayment {
    pub receipt: Receipt,
    pub plan: SettlementPlan,
    pub transaction_id: String,
}

/// Pays `amount` toward a card. Debt retirement, history entries, the
/// expense transaction and the balance decrease commit together.
pub fn pay_card_debt(
    conn: &mut Connection,
    user: &str,
    card_key: &str,
    amount: Decimal,
    now: Instant,
    policy: &Policy,
) -> LedgerResult<CardPayment> {
    let card = store::find_card(conn, user, card_key)?;
    let mut outcome = None;
    let receipt = BalanceLedger::new(conn, user, policy.max_commit_attempts).commit(|c, _| {
        let debts = store::list_debts(c, user, &card.id)?;
        let plan = allocate_fifo(&debts, amount)?;
        if !plan.remaining.is_zero() {
            return Err(LedgerError::validation(format!(
                "payment {amount} exceeds statement debt {}",
                statement_debt(&debts)
            )));
        }

        let payment_tx = Transaction {
            id: store::new_id(),
            description: format!("Card payment: {}", card.name),
            amount,
            category: CARD_PAYMENT_CATEGORY.to_string(),
            kind: TxKind::Expense,
            created_at: now,
            due_date: Some(now.date_naive()),
            is_paid: true,
            is_recurring: false,
            is_installment: false,
            installment_group_id: None,
            template_id: None,
            occurrence_date: None,
        };
        let mut mutation =
            Mutation::new(-amount).with(Write::InsertTransaction(payment_tx.clone()));
        for a in &plan.allocations {
            mutation = if a.retired() {
                mutation.with(Write::DeleteDebt {
                    debt_id: a.debt_id.clone(),
                })
            } else {
                mutation.with(Write::SetDebtAmount {
                    debt_id: a.debt_id.clone(),
                    amount: a.left,
                })
            };
            mutation = mutation.with(Write::AppendPayment(PaymentHistoryEntry {
                id: store::new_id(),
                card_id: card.id.clone(),
                description: a.description.clone(),
                amount: a.applied,
                paid_at: now,
                is_partial: !a.retired(),
            }));
        }
        outcome = Some((plan, payment_tx.id));
        Ok(mutation)
    })?;
    let (plan, transaction_id) =
        outcome.ok_or_else(|| LedgerError::validation("settlement produced no plan"))?;
    info!(
        user,
        card = %card.name,
        %amount,
        retired = plan.allocations.iter().filter(|a| a.retired()).count(),
        "card payment settled"
    );
    Ok(CardPayment {
        receipt,
        plan,
        transaction_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn debts(amounts: &[i64]) -> Vec<Debt> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| Debt {
                id: format!("d{}", i + 1),
                card_id: "c".into(),
                description: format!("charge {}", i + 1),
                amount: Decimal::from(*a),
                category: "shopping".into(),
                created_at: Utc.with_ymd_and_hms(2024, 1, 1 + i as u32, 0, 0, 0).unwrap(),
            })
            .collect()
    }

    #[test]
    fn exact_cover_retires_oldest_two() {
        let plan = allocate_fifo(&debts(&[30, 50, 40]), Decimal::from(80)).unwrap();
        assert_eq!(plan.allocations.len(), 2);
        assert!(plan.allocations.iter().all(Allocation::retired));
        assert_eq!(plan.allocations[1].debt_id, "d2");
        assert!(plan.remaining.is_zero());
    }

    #[test]
    fn short_payment_splits_second_debt() {
        let plan = allocate_fifo(&debts(&[30, 50, 40]), Decimal::from(45)).unwrap();
        assert_eq!(plan.allocations.len(), 2);
        assert!(plan.allocations[0].retired());
        let partial = &plan.allocations[1];
        assert_eq!(partial.debt_id, "d2");
        assert_eq!(partial.applied, Decimal::from(15));
        assert_eq!(partial.left, Decimal::from(35));
        assert!(plan.remaining.is_zero());
    }

    #[test]
    fn overpayment_leaves_remainder() {
        let plan = allocate_fifo(&debts(&[10]), Decimal::from(25)).unwrap();
        assert_eq!(plan.remaining, Decimal::from(15));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(allocate_fifo(&debts(&[10]), Decimal::ZERO).is_err());
        assert!(allocate_fifo(&[], Decimal::ONE).is_err());
    }

    #[test]
    fn minimum_payment_uses_policy_rate() {
        let total = statement_debt(&debts(&[30, 50, 40]));
        assert_eq!(total, Decimal::from(120));
        assert_eq!(minimum_payment(total, &Policy::default()), Decimal::from(24));
    }

    #[test]
    fn due_date_rolls_and_clamps() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(next_due_date(20, d(2024, 1, 10)), Some(d(2024, 1, 20)));
        assert_eq!(next_due_date(5, d(2024, 12, 10)), Some(d(2025, 1, 5)));
        assert_eq!(next_due_date(31, d(2024, 2, 10)), Some(d(2024, 2, 29)));
    }
}
