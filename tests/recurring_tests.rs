// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{NaiveDate, TimeZone, Utc};
use paycycle::budget::{budget_report, cycle_summary};
use paycycle::commands::settings::cycle_view;
use paycycle::db::open_in_memory;
use paycycle::models::{NewTransaction, TxKind};
use paycycle::recurring::{add_recurring, materialize, split_installment};
use paycycle::store;
use rust_decimal::Decimal;

const USER: &str = "u1";

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn rent() -> NewTransaction {
    NewTransaction {
        description: "Rent".into(),
        amount: Decimal::from(900),
        category: "housing".into(),
        kind: TxKind::Expense,
        due_date: Some(d(2024, 1, 15)),
        is_paid: false,
    }
}

#[test]
fn materialization_is_idempotent() {
    let mut conn = open_in_memory().unwrap();
    let created = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();
    let template = add_recurring(&conn, USER, &rent(), created).unwrap();

    let now = Utc.with_ymd_and_hms(2024, 4, 20, 8, 0, 0).unwrap();
    let first = materialize(&mut conn, USER, d(2024, 4, 20), now).unwrap();
    assert_eq!(first.templates, 1);
    assert_eq!(first.created, 4);

    let again = materialize(&mut conn, USER, d(2024, 4, 20), now).unwrap();
    assert_eq!(again.created, 0);

    let dates: Vec<NaiveDate> = store::list_transactions(&conn, USER)
        .unwrap()
        .into_iter()
        .filter(|t| t.template_id.as_deref() == Some(template.id.as_str()))
        .filter_map(|t| t.occurrence_date)
        .collect();
    assert_eq!(dates, vec![d(2024, 1, 15), d(2024, 2, 15), d(2024, 3, 15), d(2024, 4, 15)]);
    // Templates and occurrences never touch the balance.
    assert_eq!(store::load_settings(&conn, USER).unwrap().account_balance, Decimal::ZERO);
}

#[test]
fn budget_counts_occurrences_inside_the_cycle() {
    let mut conn = open_in_memory().unwrap();
    store::set_payment_day(&conn, USER, 10).unwrap();
    store::set_budget(&conn, USER, "housing", Decimal::from(1000)).unwrap();
    let created = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap();
    add_recurring(&conn, USER, &rent(), created).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 4, 20, 8, 0, 0).unwrap();
    materialize(&mut conn, USER, d(2024, 4, 20), now).unwrap();

    let report = budget_report(&conn, USER, d(2024, 4, 20)).unwrap();
    assert_eq!(report.cycle.start, d(2024, 4, 10));
    assert_eq!(report.cycle.end, d(2024, 5, 9));
    let housing = report.lines.iter().find(|l| l.category == "housing").unwrap();
    assert_eq!(housing.spent, Decimal::from(900));
    assert_eq!(housing.remaining, Decimal::from(100));
    assert_eq!(housing.ratio, Some(Decimal::new(9, 1)));

    let view = cycle_view(&conn, USER, d(2024, 4, 20)).unwrap();
    assert_eq!(view.current.expense, Decimal::from(900));
    assert_eq!(view.previous.cycle.start, d(2024, 3, 10));
    assert_eq!(view.previous.transactions, 1);
}

#[test]
fn installments_land_one_per_cycle() {
    let mut conn = open_in_memory().unwrap();
    store::set_payment_day(&conn, USER, 1).unwrap();
    let items = split_installment(
        &mut conn,
        USER,
        "Laptop",
        Decimal::new(100000, 2),
        3,
        d(2024, 1, 31),
        "electronics",
        Utc::now(),
    )
    .unwrap();
    let group = items[0].installment_group_id.clone();
    assert!(items.iter().all(|t| t.is_installment && t.installment_group_id == group));
    let total: Decimal = items.iter().map(|t| t.amount).sum();
    assert_eq!(total, Decimal::new(100000, 2));

    let feb = cycle_summary(&conn, USER, d(2024, 2, 15)).unwrap();
    assert_eq!(feb.transactions, 1);
    assert_eq!(feb.expense, Decimal::new(33333, 2));
    let mar = cycle_summary(&conn, USER, d(2024, 3, 15)).unwrap();
    assert_eq!(mar.expense, Decimal::new(33334, 2));
}

#[test]
fn long_backlog_drains_across_passes() {
    let mut conn = open_in_memory().unwrap();
    let created = Utc.with_ymd_and_hms(2000, 1, 10, 8, 0, 0).unwrap();
    let template = add_recurring(&conn, USER, &rent(), created).unwrap();
    let today = d(2024, 6, 1);
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();

    let latest = |conn: &rusqlite::Connection| {
        store::list_transactions(conn, USER)
            .unwrap()
            .into_iter()
            .filter(|t| t.template_id.as_deref() == Some(template.id.as_str()))
            .filter_map(|t| t.occurrence_date)
            .max()
    };

    let first = materialize(&mut conn, USER, today, now).unwrap();
    assert_eq!(first.created, 240);
    assert_eq!(latest(&conn), Some(d(2019, 12, 15)));

    // Jan 2020 through May 2024 is 53 months.
    let second = materialize(&mut conn, USER, today, now).unwrap();
    assert_eq!(second.created, 53);
    assert_eq!(latest(&conn), Some(d(2024, 5, 15)));

    let third = materialize(&mut conn, USER, today, now).unwrap();
    assert_eq!(third.created, 0);
}
