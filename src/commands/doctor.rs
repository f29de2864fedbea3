// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger::reconcile;
use crate::settlement::statement_debt;
use crate::store;
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::Result;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub kind: &'static str,
    pub detail: String,
}

pub fn diagnose(conn: &Connection, user: &str) -> Result<Vec<Issue>> {
    let mut issues = Vec::new();

    // 1) Stored balance vs replayed paid history
    let rec = reconcile(conn, user)?;
    if !rec.is_consistent() {
        issues.push(Issue {
            kind: "balance_mismatch",
            detail: format!(
                "stored {} replayed {} over {} paid txns (diff {})",
                rec.stored,
                rec.replayed,
                rec.paid_transactions,
                rec.difference()
            ),
        });
    }

    // 2) Goal totals vs their savings history
    for goal in store::list_goals(conn, user)? {
        let saved: Decimal = store::list_savings(conn, user, &goal.id)?
            .iter()
            .map(|e| e.amount)
            .sum();
        if saved != goal.current_amount {
            issues.push(Issue {
                kind: "goal_history_mismatch",
                detail: format!("{}: amount {} history {}", goal.name, goal.current_amount, saved),
            });
        }
    }

    // 3) Cards carrying more debt than their limit
    for card in store::list_cards(conn, user)? {
        let debt = statement_debt(&store::list_debts(conn, user, &card.id)?);
        if debt > card.limit {
            issues.push(Issue {
                kind: "card_over_limit",
                detail: format!("{}: debt {} limit {}", card.name, debt, card.limit),
            });
        }
    }
    Ok(issues)
}

pub fn handle(conn: &Connection, user: &str, m: &clap::ArgMatches) -> Result<()> {
    let issues = diagnose(conn, user)?;
    if maybe_print_json(m.get_flag("json"), &issues)? {
        return Ok(());
    }
    if issues.is_empty() {
        println!("✅ doctor: ledger reconciles, no issues found");
    } else {
        let rows = issues
            .into_iter()
            .map(|i| vec![i.kind.to_string(), i.detail])
            .collect();
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}
