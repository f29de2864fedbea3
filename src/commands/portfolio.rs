// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use super::{Session, arg_decimal, arg_str, opt_decimal};
use crate::models::PriceProvider;
use crate::portfolio::{BuyOrder, buy, refresh_prices, sell, set_price, valuation};
use crate::pricing::PriceResolver;
use crate::store;
use crate::utils::{fmt_money, maybe_print_json, pretty_table};

/// HTTP-backed resolver quoting in the session's reporting currency.
pub(crate) fn resolver(s: &Session) -> Result<PriceResolver> {
    PriceResolver::http(&s.cfg, &s.currency()?)
}

pub fn handle(s: &mut Session, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("buy", sub)) => buy_cmd(s, sub)?,
        Some(("sell", sub)) => {
            let attempts = s.attempts();
            let out = sell(
                &mut s.conn,
                &s.user,
                arg_str(sub, "id")?,
                arg_decimal(sub, "quantity")?,
                Utc::now(),
                attempts,
            )?;
            let ccy = s.currency()?;
            println!(
                "Sold {} @ {} (realized {}); {} left; balance {}",
                out.trade.quantity,
                out.trade.price,
                fmt_money(&out.trade.realized_pnl, &ccy),
                out.quantity,
                fmt_money(&out.receipt.balance, &ccy)
            );
        }
        Some(("value", sub)) => value(s, sub)?,
        Some(("set-price", sub)) => {
            let id = arg_str(sub, "id")?;
            let price = arg_decimal(sub, "price")?;
            set_price(&s.conn, &s.user, id, price, Utc::now())?;
            println!("Price of {} set to {}", id, price);
        }
        Some(("refresh", _)) => {
            let r = resolver(s)?;
            let report = refresh_prices(&s.conn, &s.user, &r, Utc::now())?;
            println!(
                "Checked {}, updated {}, stale {}, unavailable {}",
                report.checked, report.updated, report.stale, report.unavailable
            );
        }
        Some(("trades", sub)) => trades(s, sub)?,
        _ => {}
    }
    Ok(())
}

fn buy_cmd(s: &mut Session, sub: &clap::ArgMatches) -> Result<()> {
    let provider = arg_str(sub, "provider")?.parse::<PriceProvider>()?;
    let order = BuyOrder {
        asset_name: arg_str(sub, "name")?.to_string(),
        asset_type: arg_str(sub, "asset-type")?.to_string(),
        symbol: sub.get_one::<String>("symbol").map(|x| x.trim().to_string()),
        provider,
        quantity: arg_decimal(sub, "quantity")?,
        price: opt_decimal(sub, "price")?,
        funded: sub.get_flag("funded"),
        auto_update: sub.get_flag("auto"),
    };
    let pricer = if order.price.is_none() && provider != PriceProvider::Manual {
        Some(resolver(s)?)
    } else {
        None
    };
    let attempts = s.attempts();
    let out = buy(&mut s.conn, &s.user, &order, pricer.as_ref(), Utc::now(), attempts)?;
    println!(
        "Bought {} {} @ {} (position {} now holds {})",
        out.trade.quantity, order.asset_name, out.trade.price, out.investment_id, out.quantity
    );
    if order.funded {
        println!("Balance {}", fmt_money(&out.receipt.balance, &s.currency()?));
    }
    Ok(())
}

fn value(s: &Session, sub: &clap::ArgMatches) -> Result<()> {
    if sub.get_flag("live") {
        let r = resolver(s)?;
        refresh_prices(&s.conn, &s.user, &r, Utc::now()).context("refreshing prices")?;
    }
    let v = valuation(&s.conn, &s.user)?;
    if maybe_print_json(sub.get_flag("json"), &v)? {
        return Ok(());
    }
    let rows = v
        .positions
        .iter()
        .map(|p| {
            vec![
                p.investment.id.clone(),
                p.investment.asset_name.clone(),
                p.investment.symbol.clone().unwrap_or_default(),
                format!("{:.4}", p.investment.quantity),
                format!("{:.2}", p.investment.purchase_price),
                format!("{:.2}", p.investment.current_price),
                format!("{:.2}", p.value),
                format!("{:.2}", p.pnl),
                format!("{:.2}%", p.weight_pct),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["ID", "Asset", "Symbol", "Qty", "Avg cost", "Price", "Value", "P&L", "Weight"],
            rows
        )
    );
    let ccy = s.currency()?;
    println!(
        "Total {} | cost {} | P&L {} ({:.2}%)",
        fmt_money(&v.total_value, &ccy),
        fmt_money(&v.total_cost, &ccy),
        fmt_money(&v.pnl, &ccy),
        v.pnl_pct
    );
    Ok(())
}

fn trades(s: &Session, sub: &clap::ArgMatches) -> Result<()> {
    let trades = store::list_trades(&s.conn, &s.user)?;
    if maybe_print_json(sub.get_flag("json"), &trades)? {
        return Ok(());
    }
    let rows = trades
        .into_iter()
        .map(|t| {
            vec![
                t.executed_at.format("%Y-%m-%d %H:%M").to_string(),
                t.investment_id,
                t.side.as_str().to_string(),
                t.quantity.to_string(),
                t.price.to_string(),
                t.realized_pnl.to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["When", "Position", "Side", "Qty", "Price", "Realized"], rows)
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct PriceView<'a> {
    provider: &'a str,
    symbol: &'a str,
    currency: &'a str,
    price: rust_decimal::Decimal,
    fetched_at: String,
    stale: bool,
}

pub fn handle_price(s: &Session, m: &clap::ArgMatches) -> Result<()> {
    let provider = arg_str(m, "provider")?.parse::<PriceProvider>()?;
    let symbol = arg_str(m, "symbol")?;
    let r = resolver(s)?;
    let quote = r
        .resolve(&s.conn, provider, symbol)
        .with_context(|| format!("No price available for {}:{}", provider, symbol))?;
    let view = PriceView {
        provider: provider.as_str(),
        symbol,
        currency: r.reporting_currency(),
        price: quote.price,
        fetched_at: quote.fetched_at.to_rfc3339(),
        stale: quote.stale,
    };
    if maybe_print_json(m.get_flag("json"), &view)? {
        return Ok(());
    }
    println!(
        "{} {} = {} {}{}",
        view.provider,
        view.symbol,
        view.price,
        view.currency,
        if view.stale { " (stale)" } else { "" }
    );
    Ok(())
}
