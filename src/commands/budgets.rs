// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use super::{Session, arg_decimal, arg_str, as_of};
use crate::budget::budget_report;
use crate::store;
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::Result;

pub fn handle(s: &Session, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("set", sub)) => set(s, sub)?,
        Some(("report", sub)) => report(s, sub)?,
        _ => {}
    }
    Ok(())
}

fn set(s: &Session, sub: &clap::ArgMatches) -> Result<()> {
    let cat = arg_str(sub, "category")?;
    let amount = arg_decimal(sub, "amount")?;
    store::set_budget(&s.conn, &s.user, cat, amount)?;
    println!("Budget set for {} = {}", cat, amount);
    Ok(())
}

fn report(s: &Session, sub: &clap::ArgMatches) -> Result<()> {
    let report = budget_report(&s.conn, &s.user, as_of(sub)?)?;
    if maybe_print_json(sub.get_flag("json"), &report)? {
        return Ok(());
    }
    let ccy = s.currency()?;
    let rows = report
        .lines
        .into_iter()
        .map(|l| {
            let status = match l.ratio {
                Some(r) if r > rust_decimal::Decimal::ONE => "over".to_string(),
                Some(r) => format!("{:.0}%", r * rust_decimal::Decimal::ONE_HUNDRED),
                None => "unbudgeted".to_string(),
            };
            vec![
                l.category,
                format!("{:.2}", l.budget),
                format!("{:.2}", l.spent),
                format!("{:.2}", l.remaining),
                status,
            ]
        })
        .collect();
    println!(
        "Cycle {} .. {} ({})",
        report.cycle.start, report.cycle.end, ccy
    );
    println!(
        "{}",
        pretty_table(&["Category", "Budget", "Spent", "Remaining", "Used"], rows)
    );
    Ok(())
}
