// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;

use super::{Session, arg_decimal, arg_str, opt_date, opt_decimal};
use crate::models::{NewTransaction, TxKind};
use crate::store;
use crate::transactions::{TransactionEdit, add_transaction, delete_transaction, edit_transaction, pay};
use crate::utils::{fmt_money, maybe_print_json, pretty_table};

pub fn handle(s: &mut Session, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(s, sub)?,
        Some(("list", sub)) => list(s, sub)?,
        Some(("pay", sub)) => {
            let id = arg_str(sub, "id")?;
            let attempts = s.attempts();
            let r = pay(&mut s.conn, &s.user, id, attempts)?;
            println!("Paid {}; balance {}", id, fmt_money(&r.balance, &s.currency()?));
        }
        Some(("edit", sub)) => {
            let edit = TransactionEdit {
                description: sub.get_one::<String>("desc").cloned(),
                amount: opt_decimal(sub, "amount")?,
                category: sub.get_one::<String>("category").cloned(),
                due_date: opt_date(sub, "due")?,
            };
            let t = edit_transaction(&s.conn, &s.user, arg_str(sub, "id")?, &edit)?;
            println!("Updated {} '{}' {}", t.id, t.description, t.amount);
        }
        Some(("rm", sub)) => {
            let id = arg_str(sub, "id")?;
            let attempts = s.attempts();
            match delete_transaction(&mut s.conn, &s.user, id, attempts)? {
                Some(r) => println!(
                    "Deleted {}; balance restored to {}",
                    id,
                    fmt_money(&r.balance, &s.currency()?)
                ),
                None => println!("Deleted {}", id),
            }
        }
        _ => {}
    }
    Ok(())
}

/// Reads the shared description/amount/category/kind arguments.
pub(crate) fn new_transaction(sub: &clap::ArgMatches) -> Result<NewTransaction> {
    Ok(NewTransaction {
        description: arg_str(sub, "desc")?.to_string(),
        amount: arg_decimal(sub, "amount")?,
        category: arg_str(sub, "category")?.to_string(),
        kind: arg_str(sub, "kind")?.parse::<TxKind>()?,
        due_date: opt_date(sub, "due")?,
        is_paid: false,
    })
}

fn add(s: &mut Session, sub: &clap::ArgMatches) -> Result<()> {
    let mut input = new_transaction(sub)?;
    input.is_paid = sub.get_flag("paid");
    let attempts = s.attempts();
    let (t, receipt) = add_transaction(&mut s.conn, &s.user, &input, Utc::now(), attempts)?;
    match receipt {
        Some(r) => println!(
            "Added {} {} {} (paid); balance {}",
            t.id,
            t.kind,
            t.amount,
            fmt_money(&r.balance, &s.currency()?)
        ),
        None => println!("Added {} {} {} (unpaid)", t.id, t.kind, t.amount),
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct TxRow {
    pub id: String,
    pub date: String,
    pub description: String,
    pub category: String,
    pub kind: String,
    pub amount: String,
    pub paid: bool,
}

/// One-off transactions and materialized occurrences; templates are listed
/// by `recurring list`.
pub fn query_rows(conn: &Connection, user: &str, sub: &clap::ArgMatches) -> Result<Vec<TxRow>> {
    let unpaid_only = sub.get_flag("unpaid");
    let rows = store::list_transactions(conn, user)?
        .into_iter()
        .filter(|t| !t.is_recurring)
        .filter(|t| !(unpaid_only && t.is_paid))
        .map(|t| TxRow {
            date: t.effective_date().to_string(),
            kind: t.kind.to_string(),
            amount: t.amount.to_string(),
            paid: t.is_paid,
            id: t.id,
            description: t.description,
            category: t.category,
        })
        .collect();
    Ok(rows)
}

fn list(s: &Session, sub: &clap::ArgMatches) -> Result<()> {
    let rows = query_rows(&s.conn, &s.user, sub)?;
    if maybe_print_json(sub.get_flag("json"), &rows)? {
        return Ok(());
    }
    let data = rows
        .into_iter()
        .map(|r| {
            vec![
                r.id,
                r.date,
                r.description,
                r.category,
                r.kind,
                r.amount,
                if r.paid { "yes".into() } else { "no".into() },
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["ID", "Date", "Description", "Category", "Kind", "Amount", "Paid"],
            data
        )
    );
    Ok(())
}
