// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Spend-versus-budget for the current cycle. Read only.

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::cycle::{Cycle, current_cycle};
use crate::errors::LedgerResult;
use crate::models::{Transaction, TxKind};
use crate::store;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetLine {
    pub category: String,
    pub budget: Decimal,
    pub spent: Decimal,
    pub remaining: Decimal,
    /// `spent / budget`, or `None` when no ceiling is set.
    pub ratio: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetReport {
    pub cycle: Cycle,
    pub lines: Vec<BudgetLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSummary {
    pub cycle: Cycle,
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
    pub transactions: usize,
}

fn in_cycle<'a>(txs: &'a [Transaction], cycle: &'a Cycle) -> impl Iterator<Item = &'a Transaction> {
    txs.iter()
        .filter(move |t| !t.is_recurring && cycle.contains(t.effective_date()))
}

/// Folds expenses per category against the ceilings in `budgets`.
pub fn build_lines(
    txs: &[Transaction],
    budgets: &BTreeMap<String, Decimal>,
    cycle: &Cycle,
) -> Vec<BudgetLine> {
    let mut spent: BTreeMap<String, Decimal> = budgets
        .keys()
        .map(|c| (c.clone(), Decimal::ZERO))
        .collect();
    for t in in_cycle(txs, cycle).filter(|t| t.kind == TxKind::Expense) {
        *spent.entry(t.category.clone()).or_insert(Decimal::ZERO) += t.amount;
    }
    spent
        .into_iter()
        .map(|(category, spent)| {
            let budget = budgets.get(&category).copied().unwrap_or(Decimal::ZERO);
            let ratio = (!budget.is_zero()).then(|| (spent / budget).round_dp(4));
            BudgetLine {
                remaining: budget - spent,
                category,
                budget,
                spent,
                ratio,
            }
        })
        .collect()
}

pub fn budget_report(conn: &Connection, user: &str, today: NaiveDate) -> LedgerResult<BudgetReport> {
    let settings = store::load_settings(conn, user)?;
    let cycle = current_cycle(settings.payment_day, today)?;
    let txs = store::list_transactions(conn, user)?;
    let budgets = store::list_budgets(conn, user)?;
    Ok(BudgetReport {
        lines: build_lines(&txs, &budgets, &cycle),
        cycle,
    })
}

pub fn summarize(txs: &[Transaction], cycle: &Cycle) -> CycleSummary {
    let mut income = Decimal::ZERO;
    let mut expense = Decimal::ZERO;
    let mut count = 0;
    for t in in_cycle(txs, cycle) {
        match t.kind {
            TxKind::Income => income += t.amount,
            TxKind::Expense => expense += t.amount,
        }
        count += 1;
    }
    CycleSummary {
        cycle: *cycle,
        income,
        expense,
        net: income - expense,
        transactions: count,
    }
}

pub fn cycle_summary(conn: &Connection, user: &str, today: NaiveDate) -> LedgerResult<CycleSummary> {
    let settings = store::load_settings(conn, user)?;
    let cycle = current_cycle(settings.payment_day, today)?;
    let txs = store::list_transactions(conn, user)?;
    Ok(summarize(&txs, &cycle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn t(category: &str, amount: i64, kind: TxKind, due: Option<NaiveDate>, recurring: bool) -> Transaction {
        Transaction {
            id: store::new_id(),
            description: category.into(),
            amount: Decimal::from(amount),
            category: category.into(),
            kind,
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap(),
            due_date: due,
            is_paid: false,
            is_recurring: recurring,
            is_installment: false,
            installment_group_id: None,
            template_id: None,
            occurrence_date: None,
        }
    }

    fn d(m: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, m, day)
    }

    #[test]
    fn lines_cover_budgeted_and_unbudgeted_categories() {
        let cycle = current_cycle(15, NaiveDate::from_ymd_opt(2024, 1, 20).unwrap()).unwrap();
        let txs = vec![
            t("food", 120, TxKind::Expense, d(1, 16), false),
            t("food", 30, TxKind::Expense, d(2, 14), false),
            t("food", 999, TxKind::Expense, d(2, 15), false),
            t("travel", 80, TxKind::Expense, d(1, 20), false),
            t("rent", 900, TxKind::Expense, d(1, 20), true),
            t("salary", 3000, TxKind::Income, d(1, 15), false),
        ];
        let budgets = BTreeMap::from([
            ("food".to_string(), Decimal::from(300)),
            ("rent".to_string(), Decimal::from(1000)),
        ]);
        let lines = build_lines(&txs, &budgets, &cycle);
        assert_eq!(lines.len(), 3);

        let food = lines.iter().find(|l| l.category == "food").unwrap();
        assert_eq!(food.spent, Decimal::from(150));
        assert_eq!(food.remaining, Decimal::from(150));
        assert_eq!(food.ratio, Some(Decimal::new(5, 1)));

        let rent = lines.iter().find(|l| l.category == "rent").unwrap();
        assert!(rent.spent.is_zero());

        let travel = lines.iter().find(|l| l.category == "travel").unwrap();
        assert!(travel.budget.is_zero());
        assert_eq!(travel.ratio, None);
    }

    #[test]
    fn summary_nets_income_against_expense() {
        let cycle = current_cycle(1, NaiveDate::from_ymd_opt(2024, 1, 20).unwrap()).unwrap();
        let txs = vec![
            t("salary", 3000, TxKind::Income, None, false),
            t("food", 200, TxKind::Expense, d(1, 31), false),
            t("food", 50, TxKind::Expense, d(2, 1), false),
        ];
        let s = summarize(&txs, &cycle);
        assert_eq!(s.income, Decimal::from(3000));
        assert_eq!(s.expense, Decimal::from(200));
        assert_eq!(s.net, Decimal::from(2800));
        assert_eq!(s.transactions, 2);
    }
}
