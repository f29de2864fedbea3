// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::Utc;

use super::{Session, arg_decimal, arg_str, arg_u32};
use crate::settlement::{add_card, card_summary, charge_card, pay_card_debt};
use crate::store;
use crate::utils::{fmt_money, maybe_print_json, pretty_table};

pub fn handle(s: &mut Session, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let card = add_card(
                &s.conn,
                &s.user,
                arg_str(sub, "name")?,
                arg_decimal(sub, "limit")?,
                arg_u32(sub, "statement-day")?,
                arg_u32(sub, "due-day")?,
            )?;
            println!("Added card {} ({}) limit {}", card.name, card.id, card.limit);
        }
        Some(("list", sub)) => list(s, sub)?,
        Some(("charge", sub)) => {
            let debt = charge_card(
                &s.conn,
                &s.user,
                arg_str(sub, "card")?,
                arg_str(sub, "desc")?,
                arg_decimal(sub, "amount")?,
                arg_str(sub, "category")?,
                Utc::now(),
            )?;
            println!("Charged {} '{}' to card {}", debt.amount, debt.description, debt.card_id);
        }
        Some(("pay", sub)) => pay(s, sub)?,
        Some(("show", sub)) => show(s, sub)?,
        Some(("history", sub)) => history(s, sub)?,
        _ => {}
    }
    Ok(())
}

fn list(s: &Session, sub: &clap::ArgMatches) -> Result<()> {
    let today = Utc::now().date_naive();
    let mut summaries = Vec::new();
    for card in store::list_cards(&s.conn, &s.user)? {
        summaries.push(card_summary(&s.conn, &s.user, &card.id, today, s.policy())?);
    }
    if maybe_print_json(sub.get_flag("json"), &summaries)? {
        return Ok(());
    }
    let ccy = s.currency()?;
    let rows = summaries
        .into_iter()
        .map(|c| {
            vec![
                c.card.name,
                fmt_money(&c.card.limit, &ccy),
                fmt_money(&c.statement_debt, &ccy),
                fmt_money(&c.available_limit, &ccy),
                c.next_due.map(|d| d.to_string()).unwrap_or_default(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Card", "Limit", "Debt", "Available", "Next due"], rows)
    );
    Ok(())
}

fn pay(s: &mut Session, sub: &clap::ArgMatches) -> Result<()> {
    let amount = arg_decimal(sub, "amount")?;
    let policy = s.policy().clone();
    let payment = pay_card_debt(&mut s.conn, &s.user, arg_str(sub, "card")?, amount, Utc::now(), &policy)?;
    if maybe_print_json(sub.get_flag("json"), &payment)? {
        return Ok(());
    }
    let rows = payment
        .plan
        .allocations
        .iter()
        .map(|a| {
            vec![
                a.description.clone(),
                a.applied.to_string(),
                a.left.to_string(),
                if a.retired() { "retired".into() } else { "partial".into() },
            ]
        })
        .collect();
    println!("{}", pretty_table(&["Debt", "Applied", "Left", "Status"], rows));
    println!("Balance {}", fmt_money(&payment.receipt.balance, &s.currency()?));
    Ok(())
}

fn show(s: &Session, sub: &clap::ArgMatches) -> Result<()> {
    let summary = card_summary(
        &s.conn,
        &s.user,
        arg_str(sub, "card")?,
        Utc::now().date_naive(),
        s.policy(),
    )?;
    if maybe_print_json(sub.get_flag("json"), &summary)? {
        return Ok(());
    }
    let ccy = s.currency()?;
    let rows = store::list_debts(&s.conn, &s.user, &summary.card.id)?
        .into_iter()
        .map(|d| {
            vec![
                d.created_at.date_naive().to_string(),
                d.description,
                d.category,
                fmt_money(&d.amount, &ccy),
            ]
        })
        .collect();
    println!("{}", pretty_table(&["Date", "Description", "Category", "Amount"], rows));
    println!(
        "Statement debt {} | minimum {} | available {} | next due {}",
        fmt_money(&summary.statement_debt, &ccy),
        fmt_money(&summary.minimum_payment, &ccy),
        fmt_money(&summary.available_limit, &ccy),
        summary.next_due.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
    );
    Ok(())
}

fn history(s: &Session, sub: &clap::ArgMatches) -> Result<()> {
    let card = store::find_card(&s.conn, &s.user, arg_str(sub, "card")?)?;
    let rows = store::list_payments(&s.conn, &s.user, &card.id)?
        .into_iter()
        .map(|p| {
            vec![
                p.paid_at.format("%Y-%m-%d %H:%M").to_string(),
                p.description,
                p.amount.to_string(),
                if p.is_partial { "partial".into() } else { "full".into() },
            ]
        })
        .collect();
    println!("{}", pretty_table(&["Paid at", "Debt", "Amount", "Kind"], rows));
    Ok(())
}
