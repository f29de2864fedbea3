// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::Utc;

use super::transactions::new_transaction;
use super::{Session, arg_decimal, arg_str, arg_u32};
use crate::recurring::{add_recurring, split_installment};
use crate::scheduler::materialize_now;
use crate::store;
use crate::utils::{maybe_print_json, parse_date, pretty_table};

pub fn handle(s: &mut Session, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let input = new_transaction(sub)?;
            let t = add_recurring(&s.conn, &s.user, &input, Utc::now())?;
            println!(
                "Template {} '{}' {} every month on day {}",
                t.id,
                t.description,
                t.amount,
                input.due_date.map(|d| d.format("%d").to_string()).unwrap_or_default()
            );
        }
        Some(("list", sub)) => {
            let templates = store::list_templates(&s.conn, &s.user)?;
            if maybe_print_json(sub.get_flag("json"), &templates)? {
                return Ok(());
            }
            let rows = templates
                .into_iter()
                .map(|t| {
                    vec![
                        t.id,
                        t.description,
                        t.category,
                        t.kind.to_string(),
                        t.amount.to_string(),
                        t.due_date.map(|d| d.to_string()).unwrap_or_default(),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(&["ID", "Description", "Category", "Kind", "Amount", "First due"], rows)
            );
        }
        Some(("materialize", _)) => {
            let report = materialize_now(&mut s.conn, &s.user)?;
            println!(
                "Created {} occurrence(s) from {} template(s)",
                report.created, report.templates
            );
        }
        _ => {}
    }
    Ok(())
}

pub fn handle_installment(s: &mut Session, m: &clap::ArgMatches) -> Result<()> {
    let Some(("split", sub)) = m.subcommand() else {
        return Ok(());
    };
    let start = parse_date(arg_str(sub, "start")?).context("--start")?;
    let items = split_installment(
        &mut s.conn,
        &s.user,
        arg_str(sub, "desc")?,
        arg_decimal(sub, "amount")?,
        arg_u32(sub, "count")?,
        start,
        arg_str(sub, "category")?,
        Utc::now(),
    )?;
    let rows = items
        .into_iter()
        .map(|t| {
            vec![
                t.due_date.map(|d| d.to_string()).unwrap_or_default(),
                t.description,
                t.amount.to_string(),
            ]
        })
        .collect();
    println!("{}", pretty_table(&["Due", "Description", "Amount"], rows));
    Ok(())
}
