// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Positions, trades and portfolio valuation.
//!
//! A buy or sell moves quantity and balance in one ledger commit. Prices are
//! resolved before the commit starts; nothing here waits on the network
//! while a store transaction is open.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{LedgerError, LedgerResult, in_range};
use crate::ledger::{BalanceLedger, Mutation, Receipt, Write};
use crate::models::{Instant, Investment, PriceProvider, Trade, TradeSide, Transaction, TxKind};
use crate::pricing::PriceResolver;
use crate::store;

pub const INVESTMENT_CATEGORY: &str = "investment";

#[derive(Debug, Clone, PartialEq)]
pub struct BuyOrder {
    pub asset_name: String,
    pub asset_type: String,
    pub symbol: Option<String>,
    pub provider: PriceProvider,
    pub quantity: Decimal,
    /// Unit price; resolved from the provider when absent.
    pub price: Option<Decimal>,
    /// Pay for the purchase from the account balance.
    pub funded: bool,
    pub auto_update: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeOutcome {
    pub receipt: Receipt,
    pub investment_id: String,
    pub trade: Trade,
    /// Quantity left in the position afterwards.
    pub quantity: Decimal,
}

fn trade_transaction(description: String, amount: Decimal, kind: TxKind, now: Instant) -> Transaction {
    Transaction {
        id: store::new_id(),
        description,
        amount,
        category: INVESTMENT_CATEGORY.to_string(),
        kind,
        created_at: now,
        due_date: Some(now.date_naive()),
        is_paid: true,
        is_recurring: false,
        is_installment: false,
        installment_group_id: None,
        template_id: None,
        occurrence_date: None,
    }
}

/// Average cost after adding `qty` at `price` to a position of `held` at
/// `avg`.
pub fn weighted_average(held: Decimal, avg: Decimal, qty: Decimal, price: Decimal) -> LedgerResult<Decimal> {
    let total = in_range(held.checked_add(qty))?;
    if total.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let held_cost = in_range(held.checked_mul(avg))?;
    let added_cost = in_range(qty.checked_mul(price))?;
    let cost = in_range(held_cost.checked_add(added_cost))?;
    Ok(in_range(cost.checked_div(total))?.round_dp(8))
}

fn find_existing(conn: &Connection, user: &str, order: &BuyOrder) -> LedgerResult<Option<Investment>> {
    if let Some(symbol) = order.symbol.as_deref() {
        return store::find_position(conn, user, order.provider, symbol.trim());
    }
    Ok(store::list_investments(conn, user)?.into_iter().find(|p| {
        p.symbol.is_none()
            && p.price_provider == order.provider
            && p.asset_name.eq_ignore_ascii_case(order.asset_name.trim())
    }))
}

fn unit_price(conn: &Connection, order: &BuyOrder, resolver: Option<&PriceResolver>) -> LedgerResult<Decimal> {
    if let Some(price) = order.price {
        return Ok(price);
    }
    let symbol = order.symbol.as_deref().unwrap_or("");
    let unavailable = || LedgerError::PriceUnavailable {
        provider: order.provider.to_string(),
        symbol: symbol.to_string(),
    };
    if order.provider == PriceProvider::Manual {
        return Err(unavailable());
    }
    let quote = resolver
        .and_then(|r| r.resolve(conn, order.provider, symbol))
        .ok_or_else(unavailable)?;
    if quote.stale {
        return Err(unavailable());
    }
    Ok(quote.price)
}

pub fn buy(
    conn: &mut Connection,
    user: &str,
    order: &BuyOrder,
    resolver: Option<&PriceResolver>,
    now: Instant,
    max_attempts: u32,
) -> LedgerResult<TradeOutcome> {
    if order.asset_name.trim().is_empty() {
        return Err(LedgerError::validation("asset name is required"));
    }
    if order.quantity <= Decimal::ZERO {
        return Err(LedgerError::validation("quantity must be positive"));
    }
    if order.provider != PriceProvider::Manual && order.symbol.is_none() {
        return Err(LedgerError::validation(format!(
            "a {} position needs a symbol",
            order.provider
        )));
    }
    let price = unit_price(conn, order, resolver)?;
    if price <= Decimal::ZERO {
        return Err(LedgerError::validation("purchase price must be positive"));
    }
    let total_cost = in_range(order.quantity.checked_mul(price))?;

    let mut outcome = None;
    let receipt = BalanceLedger::new(conn, user, max_attempts).commit(|c, _| {
        let existing = find_existing(c, user, order)?;
        let (investment_id, quantity, position_write) = match existing {
            Some(p) => {
                let quantity = in_range(p.quantity.checked_add(order.quantity))?;
                let avg = weighted_average(p.quantity, p.purchase_price, order.quantity, price)?;
                (
                    p.id.clone(),
                    quantity,
                    Write::UpdatePosition {
                        investment_id: p.id,
                        quantity,
                        purchase_price: avg,
                        updated_at: now,
                    },
                )
            }
            None => {
                let inv = Investment {
                    id: store::new_id(),
                    asset_name: order.asset_name.trim().to_string(),
                    asset_type: order.asset_type.trim().to_string(),
                    quantity: order.quantity,
                    purchase_price: price,
                    current_price: price,
                    symbol: order.symbol.as_ref().map(|s| s.trim().to_string()),
                    price_provider: order.provider,
                    auto_update: order.auto_update && order.provider != PriceProvider::Manual,
                    updated_at: now,
                };
                (inv.id.clone(), inv.quantity, Write::InsertPosition(inv))
            }
        };
        let trade = Trade {
            id: store::new_id(),
            investment_id: investment_id.clone(),
            side: TradeSide::Buy,
            quantity: order.quantity,
            price,
            executed_at: now,
            realized_pnl: Decimal::ZERO,
        };
        let mut mutation = Mutation::default()
            .with(position_write)
            .with(Write::AppendTrade(trade.clone()));
        if order.funded {
            mutation.delta = -total_cost;
            mutation = mutation.funded().with(Write::InsertTransaction(trade_transaction(
                format!("Buy {} {}", order.quantity, order.asset_name.trim()),
                total_cost,
                TxKind::Expense,
                now,
            )));
        }
        outcome = Some((investment_id, trade, quantity));
        Ok(mutation)
    })?;
    let (investment_id, trade, quantity) =
        outcome.ok_or_else(|| LedgerError::validation("buy produced no trade"))?;
    info!(user, asset = %order.asset_name, qty = %order.quantity, %price, funded = order.funded, "position bought");
    Ok(TradeOutcome {
        receipt,
        investment_id,
        trade,
        quantity,
    })
}

/// Sells `quantity` at the position's current price; a full sell closes
/// the position.
pub fn sell(
    conn: &mut Connection,
    user: &str,
    investment_id: &str,
    quantity: Decimal,
    now: Instant,
    max_attempts: u32,
) -> LedgerResult<TradeOutcome> {
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::validation("quantity must be positive"));
    }
    let mut outcome = None;
    let receipt = BalanceLedger::new(conn, user, max_attempts).commit(|c, _| {
        let p = store::get_investment(c, user, investment_id)?;
        if quantity > p.quantity {
            return Err(LedgerError::validation(format!(
                "cannot sell {quantity}; position holds {}",
                p.quantity
            )));
        }
        let proceeds = in_range(quantity.checked_mul(p.current_price))?;
        let realized = in_range(
            p.current_price
                .checked_sub(p.purchase_price)
                .and_then(|gain| gain.checked_mul(quantity)),
        )?;
        let left = p.quantity - quantity;
        let trade = Trade {
            id: store::new_id(),
            investment_id: p.id.clone(),
            side: TradeSide::Sell,
            quantity,
            price: p.current_price,
            executed_at: now,
            realized_pnl: realized,
        };
        let position_write = if left.is_zero() {
            Write::DeletePosition {
                investment_id: p.id.clone(),
            }
        } else {
            Write::UpdatePosition {
                investment_id: p.id.clone(),
                quantity: left,
                purchase_price: p.purchase_price,
                updated_at: now,
            }
        };
        let mut mutation = Mutation::new(proceeds)
            .with(Write::AppendTrade(trade.clone()))
            .with(position_write);
        if proceeds > Decimal::ZERO {
            mutation = mutation.with(Write::InsertTransaction(trade_transaction(
                format!("Sell {quantity} {}", p.asset_name),
                proceeds,
                TxKind::Income,
                now,
            )));
        }
        outcome = Some((trade, left));
        Ok(mutation)
    })?;
    let (trade, left) = outcome.ok_or_else(|| LedgerError::validation("sell produced no trade"))?;
    info!(user, investment_id, qty = %quantity, realized = %trade.realized_pnl, "position sold");
    Ok(TradeOutcome {
        receipt,
        investment_id: investment_id.to_string(),
        trade,
        quantity: left,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionValue {
    pub investment: Investment,
    pub cost: Decimal,
    pub value: Decimal,
    pub pnl: Decimal,
    pub pnl_pct: Decimal,
    pub weight_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Valuation {
    pub positions: Vec<PositionValue>,
    pub total_cost: Decimal,
    pub total_value: Decimal,
    pub pnl: Decimal,
    pub pnl_pct: Decimal,
}

fn pct(part: Decimal, whole: Decimal) -> LedgerResult<Decimal> {
    if whole.is_zero() {
        return Ok(Decimal::ZERO);
    }
    in_range(
        part.checked_div(whole)
            .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED)),
    )
}

fn sum(values: impl IntoIterator<Item = Decimal>) -> LedgerResult<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| in_range(acc.checked_add(v)))
}

pub fn value_positions(positions: Vec<Investment>) -> LedgerResult<Valuation> {
    let mut priced = Vec::with_capacity(positions.len());
    for investment in positions {
        let cost = in_range(investment.quantity.checked_mul(investment.purchase_price))?;
        let value = in_range(investment.quantity.checked_mul(investment.current_price))?;
        priced.push((investment, cost, value));
    }
    let total_cost = sum(priced.iter().map(|(_, cost, _)| *cost))?;
    let total_value = sum(priced.iter().map(|(_, _, value)| *value))?;
    let pnl = in_range(total_value.checked_sub(total_cost))?;

    let mut positions = Vec::with_capacity(priced.len());
    for (investment, cost, value) in priced {
        let gain = in_range(value.checked_sub(cost))?;
        positions.push(PositionValue {
            pnl: gain,
            pnl_pct: pct(gain, cost)?,
            weight_pct: pct(value, total_value)?,
            investment,
            cost,
            value,
        });
    }
    Ok(Valuation {
        positions,
        total_cost,
        total_value,
        pnl,
        pnl_pct: pct(pnl, total_cost)?,
    })
}

pub fn valuation(conn: &Connection, user: &str) -> LedgerResult<Valuation> {
    value_positions(store::list_investments(conn, user)?)
}

/// Manual price edit.
pub fn set_price(
    conn: &Connection,
    user: &str,
    investment_id: &str,
    price: Decimal,
    now: Instant,
) -> LedgerResult<()> {
    if price <= Decimal::ZERO {
        return Err(LedgerError::validation("price must be positive"));
    }
    store::update_current_price(conn, user, investment_id, price, now)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshReport {
    pub checked: usize,
    pub updated: usize,
    pub stale: usize,
    pub unavailable: usize,
}

/// Re-prices every auto-updating position. Stale and missing quotes leave
/// the stored price alone.
pub fn refresh_prices(
    conn: &Connection,
    user: &str,
    resolver: &PriceResolver,
    now: Instant,
) -> LedgerResult<RefreshReport> {
    let mut report = RefreshReport::default();
    for p in store::list_investments(conn, user)? {
        if !p.auto_update || p.price_provider == PriceProvider::Manual {
            continue;
        }
        let Some(symbol) = p.symbol.as_deref() else {
            continue;
        };
        report.checked += 1;
        match resolver.resolve_at(conn, p.price_provider, symbol, now) {
            Some(q) if q.stale => report.stale += 1,
            Some(q) if q.price != p.current_price => {
                store::update_current_price(conn, user, &p.id, q.price, now)?;
                debug!(user, asset = %p.asset_name, old = %p.current_price, new = %q.price, "price updated");
                report.updated += 1;
            }
            Some(_) => {}
            None => {
                warn!(user, asset = %p.asset_name, %symbol, "no price for position");
                report.unavailable += 1;
            }
        }
    }
    info!(user, checked = report.checked, updated = report.updated, "price refresh pass");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::open_in_memory;
    use crate::ledger::reconcile;
    use crate::pricing::stub::StubSource;
    use crate::transactions::adjust_balance;
    use chrono::Utc;
    use serde_json::json;

    fn manual(name: &str, qty: i64, price: i64, funded: bool) -> BuyOrder {
        BuyOrder {
            asset_name: name.into(),
            asset_type: "stock".into(),
            symbol: None,
            provider: PriceProvider::Manual,
            quantity: Decimal::from(qty),
            price: Some(Decimal::from(price)),
            funded,
            auto_update: false,
        }
    }

    #[test]
    fn repeated_buys_average_cost_and_conserve_balance() {
        let mut conn = open_in_memory().unwrap();
        adjust_balance(&mut conn, "u", Decimal::from(10_000), Utc::now(), 3).unwrap();

        let first = buy(&mut conn, "u", &manual("ACME", 10, 100, true), None, Utc::now(), 3).unwrap();
        let second = buy(&mut conn, "u", &manual("acme", 10, 200, true), None, Utc::now(), 3).unwrap();
        assert_eq!(first.investment_id, second.investment_id);
        assert_eq!(second.receipt.balance, Decimal::from(7_000));

        let p = store::get_investment(&conn, "u", &first.investment_id).unwrap();
        assert_eq!(p.quantity, Decimal::from(20));
        assert_eq!(p.purchase_price, Decimal::from(150));
        assert_eq!(store::list_trades(&conn, "u").unwrap().len(), 2);
        assert!(reconcile(&conn, "u").unwrap().is_consistent());
    }

    #[test]
    fn funded_buy_without_cash_changes_nothing() {
        let mut conn = open_in_memory().unwrap();
        let err = buy(&mut conn, "u", &manual("ACME", 1, 50, true), None, Utc::now(), 3).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert!(store::list_investments(&conn, "u").unwrap().is_empty());
        assert!(store::list_trades(&conn, "u").unwrap().is_empty());
    }

    #[test]
    fn sell_partial_then_full() {
        let mut conn = open_in_memory().unwrap();
        let b = buy(&mut conn, "u", &manual("ACME", 10, 100, false), None, Utc::now(), 3).unwrap();
        set_price(&conn, "u", &b.investment_id, Decimal::from(120), Utc::now()).unwrap();

        let s = sell(&mut conn, "u", &b.investment_id, Decimal::from(4), Utc::now(), 3).unwrap();
        assert_eq!(s.receipt.balance, Decimal::from(480));
        assert_eq!(s.trade.realized_pnl, Decimal::from(80));
        assert_eq!(s.quantity, Decimal::from(6));

        assert!(sell(&mut conn, "u", &b.investment_id, Decimal::from(7), Utc::now(), 3).is_err());
        sell(&mut conn, "u", &b.investment_id, Decimal::from(6), Utc::now(), 3).unwrap();
        assert!(store::list_investments(&conn, "u").unwrap().is_empty());
        assert!(reconcile(&conn, "u").unwrap().is_consistent());
    }

    #[test]
    fn weights_sum_to_one_hundred() {
        let mut conn = open_in_memory().unwrap();
        for (name, qty, price) in [("A", 3, 10), ("B", 7, 13), ("C", 1, 99)] {
            buy(&mut conn, "u", &manual(name, qty, price, false), None, Utc::now(), 3).unwrap();
        }
        let v = valuation(&conn, "u").unwrap();
        let sum: Decimal = v.positions.iter().map(|p| p.weight_pct).sum();
        assert!((sum - Decimal::ONE_HUNDRED).abs() < Decimal::new(1, 6));
        assert!(v.pnl.is_zero());
        assert!(v.pnl_pct.is_zero());
    }

    #[test]
    fn empty_portfolio_has_zero_percentages() {
        let v = value_positions(Vec::new()).unwrap();
        assert!(v.pnl_pct.is_zero());
        assert!(v.positions.is_empty());
    }

    #[test]
    fn priced_buy_and_refresh_use_resolver() {
        let mut conn = open_in_memory().unwrap();
        let src = StubSource::default();
        src.route("ids=bitcoin", json!({"bitcoin": {"try": 1000}}));
        let resolver = PriceResolver::new(Box::new(src.clone()), &AppConfig::default(), "TRY");
        let order = BuyOrder {
            asset_name: "Bitcoin".into(),
            asset_type: "crypto".into(),
            symbol: Some("BTC".into()),
            provider: PriceProvider::Crypto,
            quantity: Decimal::ONE,
            price: None,
            funded: false,
            auto_update: true,
        };
        let b = buy(&mut conn, "u", &order, Some(&resolver), Utc::now(), 3).unwrap();
        assert_eq!(b.trade.price, Decimal::from(1000));

        src.route("ids=bitcoin", json!({"bitcoin": {"try": 1100}}));
        let later = Utc::now() + chrono::Duration::minutes(10);
        let report = refresh_prices(&conn, "u", &resolver, later).unwrap();
        assert_eq!(report.updated, 1);
        let p = store::get_investment(&conn, "u", &b.investment_id).unwrap();
        assert_eq!(p.current_price, Decimal::from(1100));
        assert_eq!(p.quantity, Decimal::ONE);
    }

    #[test]
    fn unpriced_buy_is_blocked() {
        let mut conn = open_in_memory().unwrap();
        let src = StubSource::default();
        let resolver = PriceResolver::new(Box::new(src), &AppConfig::default(), "TRY");
        let order = BuyOrder {
            asset_name: "Gold".into(),
            asset_type: "metal".into(),
            symbol: Some("gram_altin".into()),
            provider: PriceProvider::Metals,
            quantity: Decimal::ONE,
            price: None,
            funded: false,
            auto_update: true,
        };
        let err = buy(&mut conn, "u", &order, Some(&resolver), Utc::now(), 3).unwrap_err();
        assert!(matches!(err, LedgerError::PriceUnavailable { .. }));
    }

    #[test]
    fn oversized_order_is_rejected_not_panicking() {
        let mut conn = open_in_memory().unwrap();
        let mut order = manual("Whale", 1, 1, true);
        order.quantity = "100000000000000000000".parse().unwrap();
        order.price = Some("10000000000".parse().unwrap());
        let err = buy(&mut conn, "u", &order, None, Utc::now(), 3).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ref m) if m == "amount out of range"));
        assert!(store::list_investments(&conn, "u").unwrap().is_empty());
        assert!(store::list_trades(&conn, "u").unwrap().is_empty());
    }

    #[test]
    fn padded_symbol_averages_into_existing_position() {
        let mut conn = open_in_memory().unwrap();
        let order = |symbol: &str, price: i64| BuyOrder {
            asset_name: "Bitcoin".into(),
            asset_type: "crypto".into(),
            symbol: Some(symbol.into()),
            provider: PriceProvider::Crypto,
            quantity: Decimal::ONE,
            price: Some(Decimal::from(price)),
            funded: false,
            auto_update: false,
        };
        let first = buy(&mut conn, "u", &order("BTC", 100), None, Utc::now(), 3).unwrap();
        let second = buy(&mut conn, "u", &order(" btc ", 300), None, Utc::now(), 3).unwrap();
        assert_eq!(first.investment_id, second.investment_id);
        let positions = store::list_investments(&conn, "u").unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, Decimal::TWO);
        assert_eq!(positions[0].purchase_price, Decimal::from(200));
        assert_eq!(positions[0].symbol.as_deref(), Some("BTC"));
    }
}
