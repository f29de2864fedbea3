// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{TimeZone, Utc};
use paycycle::config::Policy;
use paycycle::db::open_in_memory;
use paycycle::goals::{create_goal, delete_goal, transfer_to_goal};
use paycycle::ledger::reconcile;
use paycycle::models::{NewTransaction, PriceProvider, TxKind};
use paycycle::portfolio::{BuyOrder, buy, sell, set_price};
use paycycle::settlement::{add_card, charge_card, pay_card_debt};
use paycycle::transactions::{add_transaction, adjust_balance, delete_transaction, pay};
use paycycle::{LedgerError, store};
use rusqlite::Connection;
use rust_decimal::Decimal;

const USER: &str = "alice";

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn expense(desc: &str, amount: &str, paid: bool) -> NewTransaction {
    NewTransaction {
        description: desc.into(),
        amount: dec(amount),
        category: "groceries".into(),
        kind: TxKind::Expense,
        due_date: None,
        is_paid: paid,
    }
}

fn balance(conn: &Connection) -> Decimal {
    store::load_settings(conn, USER).unwrap().account_balance
}

fn assert_reconciles(conn: &Connection) {
    let rec = reconcile(conn, USER).unwrap();
    assert!(rec.is_consistent(), "stored {} replayed {}", rec.stored, rec.replayed);
}

#[test]
fn mixed_operations_keep_balance_equal_to_paid_history() {
    let mut conn = open_in_memory().unwrap();
    let now = Utc::now();
    adjust_balance(&mut conn, USER, dec("1000"), now, 3).unwrap();

    let (bill, r) = add_transaction(&mut conn, USER, &expense("Power", "120.50", false), now, 3).unwrap();
    assert!(r.is_none());
    assert_eq!(balance(&conn), dec("1000"));
    pay(&mut conn, USER, &bill.id, 3).unwrap();
    assert_eq!(balance(&conn), dec("879.50"));
    assert!(pay(&mut conn, USER, &bill.id, 3).is_err());
    assert_eq!(balance(&conn), dec("879.50"));

    let goal = create_goal(&conn, USER, "Holiday", dec("500"), None).unwrap();
    transfer_to_goal(&mut conn, USER, "Holiday", dec("200"), now, 3).unwrap();
    assert_eq!(balance(&conn), dec("679.50"));
    assert_eq!(store::get_goal(&conn, USER, &goal.id).unwrap().current_amount, dec("200"));

    let order = BuyOrder {
        asset_name: "Index fund".into(),
        asset_type: "fund".into(),
        symbol: None,
        provider: PriceProvider::Manual,
        quantity: dec("4"),
        price: Some(dec("50")),
        funded: true,
        auto_update: false,
    };
    let bought = buy(&mut conn, USER, &order, None, now, 3).unwrap();
    assert_eq!(balance(&conn), dec("479.50"));
    set_price(&conn, USER, &bought.investment_id, dec("60"), now).unwrap();
    let sold = sell(&mut conn, USER, &bought.investment_id, dec("4"), now, 3).unwrap();
    assert_eq!(sold.trade.realized_pnl, dec("40"));
    assert_eq!(balance(&conn), dec("719.50"));

    delete_goal(&mut conn, USER, &goal.id, now, 3).unwrap();
    assert_eq!(balance(&conn), dec("919.50"));

    delete_transaction(&mut conn, USER, &bill.id, 3).unwrap();
    assert_eq!(balance(&conn), dec("1040"));
    assert_reconciles(&conn);
}

#[test]
fn card_payments_retire_debts_oldest_first() {
    let mut conn = open_in_memory().unwrap();
    let policy = Policy::default();
    adjust_balance(&mut conn, USER, dec("500"), Utc::now(), 3).unwrap();
    add_card(&conn, USER, "Visa", dec("1000"), 5, 20).unwrap();
    for (day, amount) in [(1, "30"), (2, "50"), (3, "40")] {
        let at = Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap();
        charge_card(&conn, USER, "Visa", &format!("charge {day}"), dec(amount), "shopping", at).unwrap();
    }
    let card = store::find_card(&conn, USER, "Visa").unwrap();

    let first = pay_card_debt(&mut conn, USER, "Visa", dec("70"), Utc::now(), &policy).unwrap();
    assert_eq!(first.plan.allocations.len(), 2);
    let left: Vec<Decimal> = store::list_debts(&conn, USER, &card.id)
        .unwrap()
        .iter()
        .map(|d| d.amount)
        .collect();
    assert_eq!(left, vec![dec("10"), dec("40")]);

    pay_card_debt(&mut conn, USER, "Visa", dec("45"), Utc::now(), &policy).unwrap();
    let left: Vec<Decimal> = store::list_debts(&conn, USER, &card.id)
        .unwrap()
        .iter()
        .map(|d| d.amount)
        .collect();
    assert_eq!(left, vec![dec("5")]);

    let history = store::list_payments(&conn, USER, &card.id).unwrap();
    let partial: Vec<bool> = history.iter().map(|h| h.is_partial).collect();
    assert_eq!(partial, vec![false, true, false, true]);
    assert_eq!(balance(&conn), dec("385"));
    assert_reconciles(&conn);
}

#[test]
fn card_overpayment_is_rejected_without_side_effects() {
    let mut conn = open_in_memory().unwrap();
    add_card(&conn, USER, "Amex", dec("300"), 1, 10).unwrap();
    charge_card(&conn, USER, "Amex", "Books", dec("25"), "education", Utc::now()).unwrap();
    let err = pay_card_debt(&mut conn, USER, "Amex", dec("30"), Utc::now(), &Policy::default()).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(balance(&conn), Decimal::ZERO);
    let card = store::find_card(&conn, USER, "Amex").unwrap();
    assert!(store::list_payments(&conn, USER, &card.id).unwrap().is_empty());
}

#[test]
fn tenants_do_not_see_each_other() {
    let mut conn = open_in_memory().unwrap();
    adjust_balance(&mut conn, "alice", dec("10"), Utc::now(), 3).unwrap();
    adjust_balance(&mut conn, "bob", dec("99"), Utc::now(), 3).unwrap();
    assert_eq!(store::load_settings(&conn, "alice").unwrap().account_balance, dec("10"));
    assert_eq!(store::list_transactions(&conn, "bob").unwrap().len(), 1);
    let err = transfer_to_goal(&mut conn, "bob", "missing", dec("1"), Utc::now(), 3).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}
