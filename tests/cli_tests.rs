// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::Utc;
use paycycle::commands::{doctor, transactions};
use paycycle::db::open_in_memory;
use paycycle::models::{NewTransaction, TxKind};
use paycycle::{cli, transactions as ops};
use rusqlite::{Connection, params};
use rust_decimal::Decimal;

fn setup() -> Connection {
    let mut conn = open_in_memory().unwrap();
    for (i, paid) in [false, true, false].into_iter().enumerate() {
        let input = NewTransaction {
            description: format!("Item {}", i + 1),
            amount: Decimal::from(10),
            category: "misc".into(),
            kind: TxKind::Expense,
            due_date: chrono::NaiveDate::from_ymd_opt(2025, 1, 1 + i as u32),
            is_paid: paid,
        };
        ops::add_transaction(&mut conn, "local", &input, Utc::now(), 3).unwrap();
    }
    conn
}

#[test]
fn list_unpaid_filters_paid_rows() {
    let conn = setup();
    let cli = cli::build_cli();
    let matches = cli.get_matches_from(["paycycle", "tx", "list", "--unpaid"]);
    if let Some(("tx", tx_m)) = matches.subcommand() {
        if let Some(("list", list_m)) = tx_m.subcommand() {
            let rows = transactions::query_rows(&conn, "local", list_m).unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].date, "2025-01-01");
            assert_eq!(rows[1].date, "2025-01-03");
            assert!(rows.iter().all(|r| !r.paid));
        } else {
            panic!("no list subcommand");
        }
    } else {
        panic!("no tx subcommand");
    }
}

#[test]
fn doctor_flags_a_tampered_balance() {
    let conn = setup();
    let matches = cli::build_cli().get_matches_from(["paycycle", "doctor", "--json"]);
    let Some(("doctor", doctor_m)) = matches.subcommand() else {
        panic!("no doctor subcommand");
    };
    assert!(doctor_m.get_flag("json"));
    assert!(doctor::diagnose(&conn, "local").unwrap().is_empty());

    conn.execute(
        "UPDATE settings SET account_balance='5' WHERE user_id=?1",
        params!["local"],
    )
    .unwrap();
    let issues = doctor::diagnose(&conn, "local").unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, "balance_mismatch");
}

#[test]
fn invalid_payment_day_is_a_parse_error() {
    let res = cli::build_cli().try_get_matches_from(["paycycle", "settings", "payment-day", "--day", "x"]);
    assert!(res.is_err());
}
