// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::Utc;

use super::{Session, arg_decimal, arg_str, opt_date};
use crate::goals::{create_goal, delete_goal, list_goals, transfer_to_goal};
use crate::store;
use crate::utils::{fmt_money, maybe_print_json, pretty_table};

pub fn handle(s: &mut Session, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let goal = create_goal(
                &s.conn,
                &s.user,
                arg_str(sub, "name")?,
                arg_decimal(sub, "target")?,
                opt_date(sub, "date")?,
            )?;
            println!("Created goal {} ({}) target {}", goal.name, goal.id, goal.target_amount);
        }
        Some(("list", sub)) => list(s, sub)?,
        Some(("transfer", sub)) => {
            let goal = arg_str(sub, "goal")?;
            let attempts = s.attempts();
            let r = transfer_to_goal(&mut s.conn, &s.user, goal, arg_decimal(sub, "amount")?, Utc::now(), attempts)?;
            println!("Moved to '{}'; balance {}", goal, fmt_money(&r.balance, &s.currency()?));
        }
        Some(("rm", sub)) => {
            let goal = arg_str(sub, "goal")?;
            let attempts = s.attempts();
            let r = delete_goal(&mut s.conn, &s.user, goal, Utc::now(), attempts)?;
            let ccy = s.currency()?;
            println!(
                "Deleted goal '{}'; refunded {}, balance {}",
                goal,
                fmt_money(&(r.balance - r.previous_balance), &ccy),
                fmt_money(&r.balance, &ccy)
            );
        }
        _ => {}
    }
    Ok(())
}

fn list(s: &Session, sub: &clap::ArgMatches) -> Result<()> {
    let goals = list_goals(&s.conn, &s.user)?;
    if maybe_print_json(sub.get_flag("json"), &goals)? {
        return Ok(());
    }
    let ccy = s.currency()?;
    let mut rows = Vec::with_capacity(goals.len());
    for g in goals {
        let deposits = store::list_savings(&s.conn, &s.user, &g.goal.id)?.len();
        rows.push(vec![
            g.goal.name,
            fmt_money(&g.goal.current_amount, &ccy),
            fmt_money(&g.goal.target_amount, &ccy),
            format!("{}%", g.percent),
            g.goal.target_date.map(|d| d.to_string()).unwrap_or_default(),
            deposits.to_string(),
        ]);
    }
    println!(
        "{}",
        pretty_table(&["Goal", "Saved", "Target", "Progress", "By", "Deposits"], rows)
    );
    Ok(())
}
