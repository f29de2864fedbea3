// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;

use super::{Session, arg_decimal, arg_str, arg_u32, as_of};
use crate::budget::{CycleSummary, summarize};
use crate::cycle::{current_cycle, previous_cycle};
use crate::models::Settings;
use crate::store;
use crate::transactions::adjust_balance;
use crate::utils::{fmt_money, maybe_print_json, pretty_table, set_reporting_currency};

pub fn handle(s: &mut Session, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("show", sub)) => show(s, sub)?,
        Some(("payment-day", sub)) => {
            let day = arg_u32(sub, "day")?;
            store::set_payment_day(&s.conn, &s.user, day)?;
            println!("Payment day set to {}", day);
        }
        Some(("currency", sub)) => {
            set_reporting_currency(&s.conn, arg_str(sub, "code")?)?;
            println!("Reporting currency is now {} (price cache cleared)", s.currency()?);
        }
        Some(("balance", sub)) => {
            let target = arg_decimal(sub, "set")?;
            let ccy = s.currency()?;
            let attempts = s.attempts();
            match adjust_balance(&mut s.conn, &s.user, target, Utc::now(), attempts)? {
                Some(r) => println!(
                    "Balance adjusted {} -> {}",
                    fmt_money(&r.previous_balance, &ccy),
                    fmt_money(&r.balance, &ccy)
                ),
                None => println!("Balance already {}", fmt_money(&target, &ccy)),
            }
        }
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SettingsView<'a> {
    user: &'a str,
    reporting_currency: String,
    #[serde(flatten)]
    settings: Settings,
}

fn show(s: &Session, sub: &clap::ArgMatches) -> Result<()> {
    let view = SettingsView {
        user: &s.user,
        reporting_currency: s.currency()?,
        settings: store::load_settings(&s.conn, &s.user)?,
    };
    if maybe_print_json(sub.get_flag("json"), &view)? {
        return Ok(());
    }
    let rows = vec![
        vec!["User".into(), view.user.to_string()],
        vec!["Payment day".into(), view.settings.payment_day.to_string()],
        vec![
            "Balance".into(),
            fmt_money(&view.settings.account_balance, &view.reporting_currency),
        ],
        vec!["Reporting currency".into(), view.reporting_currency.clone()],
    ];
    println!("{}", pretty_table(&["Setting", "Value"], rows));
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleView {
    pub current: CycleSummary,
    pub previous: CycleSummary,
}

/// Income and expense of the cycle containing `today` and the one before it.
pub fn cycle_view(conn: &Connection, user: &str, today: NaiveDate) -> Result<CycleView> {
    let settings = store::load_settings(conn, user)?;
    let txs = store::list_transactions(conn, user)?;
    let current = current_cycle(settings.payment_day, today)?;
    let previous = previous_cycle(settings.payment_day, today)?;
    Ok(CycleView {
        current: summarize(&txs, &current),
        previous: summarize(&txs, &previous),
    })
}

pub fn handle_cycle(s: &Session, m: &clap::ArgMatches) -> Result<()> {
    let view = cycle_view(&s.conn, &s.user, as_of(m)?)?;
    if maybe_print_json(m.get_flag("json"), &view)? {
        return Ok(());
    }
    let ccy = s.currency()?;
    let rows = [("current", &view.current), ("previous", &view.previous)]
        .into_iter()
        .map(|(label, c)| {
            vec![
                label.to_string(),
                c.cycle.start.to_string(),
                c.cycle.end.to_string(),
                fmt_money(&c.income, &ccy),
                fmt_money(&c.expense, &ccy),
                fmt_money(&c.net, &ccy),
                c.transactions.to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Cycle", "Start", "End", "Income", "Expense", "Net", "Txns"], rows)
    );
    Ok(())
}
