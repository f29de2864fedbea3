// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Command, arg, value_parser};

fn json_flag() -> clap::Arg {
    arg!(--json "Print JSON instead of a table")
}

fn tx_fields(cmd: Command) -> Command {
    cmd.arg(arg!(--desc <DESCRIPTION>).required(true))
        .arg(arg!(--amount <AMOUNT>).required(true))
        .arg(arg!(--category <CATEGORY>).required(true))
        .arg(
            arg!(--kind <KIND> "income | expense")
                .required(false)
                .default_value("expense"),
        )
}

pub fn build_cli() -> Command {
    Command::new("paycycle")
        .about("Personal finance ledger: cycles, cards, goals and investments")
        .version(clap::crate_version!())
        .arg(arg!(--home <DIR> "Override config and data directories").global(true))
        .arg(arg!(--user <USER> "Tenant id (defaults to PAYCYCLE_USER, then config)").global(true))
        .subcommand(Command::new("init").about("Create config and database"))
        .subcommand(
            Command::new("settings")
                .about("Payment day, reporting currency and balance")
                .subcommand(Command::new("show").arg(json_flag()))
                .subcommand(
                    Command::new("payment-day").arg(
                        arg!(--day <DAY> "1..=28")
                            .required(true)
                            .value_parser(value_parser!(u32)),
                    ),
                )
                .subcommand(Command::new("currency").arg(arg!(--code <CCY>).required(true)))
                .subcommand(
                    Command::new("balance")
                        .about("Record an adjustment so the balance equals AMOUNT")
                        .arg(arg!(--set <AMOUNT>).required(true)),
                ),
        )
        .subcommand(
            Command::new("cycle")
                .about("Current and previous financial cycle")
                .arg(arg!(--date <DATE> "Evaluate as of YYYY-MM-DD").required(false))
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("tx")
                .about("One-off transactions")
                .subcommand(
                    tx_fields(Command::new("add"))
                        .arg(arg!(--due <DATE>).required(false))
                        .arg(arg!(--paid "Settle immediately")),
                )
                .subcommand(
                    Command::new("list")
                        .arg(arg!(--unpaid "Only unpaid transactions"))
                        .arg(json_flag()),
                )
                .subcommand(Command::new("pay").arg(arg!(--id <ID>).required(true)))
                .subcommand(
                    Command::new("edit")
                        .arg(arg!(--id <ID>).required(true))
                        .arg(arg!(--desc <DESCRIPTION>).required(false))
                        .arg(arg!(--amount <AMOUNT>).required(false))
                        .arg(arg!(--category <CATEGORY>).required(false))
                        .arg(arg!(--due <DATE>).required(false)),
                )
                .subcommand(Command::new("rm").arg(arg!(--id <ID>).required(true))),
        )
        .subcommand(
            Command::new("recurring")
                .about("Monthly templates")
                .subcommand(tx_fields(Command::new("add")).arg(arg!(--due <DATE>).required(true)))
                .subcommand(Command::new("list").arg(json_flag()))
                .subcommand(Command::new("materialize").about("Create due occurrences now")),
        )
        .subcommand(
            Command::new("installment").subcommand(
                Command::new("split")
                    .arg(arg!(--desc <DESCRIPTION>).required(true))
                    .arg(arg!(--amount <AMOUNT>).required(true))
                    .arg(
                        arg!(--count <N>)
                            .required(true)
                            .value_parser(value_parser!(u32)),
                    )
                    .arg(arg!(--start <DATE>).required(true))
                    .arg(arg!(--category <CATEGORY>).required(true)),
            ),
        )
        .subcommand(
            Command::new("card")
                .about("Credit cards and their debts")
                .subcommand(
                    Command::new("add")
                        .arg(arg!(--name <NAME>).required(true))
                        .arg(arg!(--limit <AMOUNT>).required(true))
                        .arg(
                            arg!(--"statement-day" <DAY>)
                                .required(true)
                                .value_parser(value_parser!(u32)),
                        )
                        .arg(
                            arg!(--"due-day" <DAY>)
                                .required(true)
                                .value_parser(value_parser!(u32)),
                        ),
                )
                .subcommand(Command::new("list").arg(json_flag()))
                .subcommand(
                    Command::new("charge")
                        .arg(arg!(--card <CARD>).required(true))
                        .arg(arg!(--desc <DESCRIPTION>).required(true))
                        .arg(arg!(--amount <AMOUNT>).required(true))
                        .arg(arg!(--category <CATEGORY>).required(true)),
                )
                .subcommand(
                    Command::new("pay")
                        .arg(arg!(--card <CARD>).required(true))
                        .arg(arg!(--amount <AMOUNT>).required(true))
                        .arg(json_flag()),
                )
                .subcommand(
                    Command::new("show")
                        .arg(arg!(--card <CARD>).required(true))
                        .arg(json_flag()),
                )
                .subcommand(Command::new("history").arg(arg!(--card <CARD>).required(true))),
        )
        .subcommand(
            Command::new("goal")
                .about("Savings goals")
                .subcommand(
                    Command::new("add")
                        .arg(arg!(--name <NAME>).required(true))
                        .arg(arg!(--target <AMOUNT>).required(true))
                        .arg(arg!(--date <DATE>).required(false)),
                )
                .subcommand(Command::new("list").arg(json_flag()))
                .subcommand(
                    Command::new("transfer")
                        .arg(arg!(--goal <GOAL>).required(true))
                        .arg(arg!(--amount <AMOUNT>).required(true)),
                )
                .subcommand(Command::new("rm").arg(arg!(--goal <GOAL>).required(true))),
        )
        .subcommand(
            Command::new("budget")
                .about("Per-category ceilings for the current cycle")
                .subcommand(
                    Command::new("set")
                        .arg(arg!(--category <CATEGORY>).required(true))
                        .arg(arg!(--amount <AMOUNT>).required(true)),
                )
                .subcommand(
                    Command::new("report")
                        .arg(arg!(--date <DATE>).required(false))
                        .arg(json_flag()),
                ),
        )
        .subcommand(
            Command::new("invest")
                .about("Positions and trades")
                .subcommand(
                    Command::new("buy")
                        .arg(arg!(--name <NAME>).required(true))
                        .arg(
                            arg!(--"asset-type" <TYPE>)
                                .required(false)
                                .default_value("other"),
                        )
                        .arg(arg!(--symbol <SYMBOL>).required(false))
                        .arg(
                            arg!(--provider <PROVIDER> "manual | crypto | forex | metals")
                                .required(false)
                                .default_value("manual"),
                        )
                        .arg(arg!(--quantity <QTY>).required(true))
                        .arg(arg!(--price <PRICE> "Unit price; fetched when omitted").required(false))
                        .arg(arg!(--funded "Pay from the account balance"))
                        .arg(arg!(--auto "Keep the price refreshed")),
                )
                .subcommand(
                    Command::new("sell")
                        .arg(arg!(--id <ID>).required(true))
                        .arg(arg!(--quantity <QTY>).required(true)),
                )
                .subcommand(
                    Command::new("value")
                        .arg(arg!(--live "Refresh prices first"))
                        .arg(json_flag()),
                )
                .subcommand(
                    Command::new("set-price")
                        .arg(arg!(--id <ID>).required(true))
                        .arg(arg!(--price <PRICE>).required(true)),
                )
                .subcommand(Command::new("refresh"))
                .subcommand(Command::new("trades").arg(json_flag())),
        )
        .subcommand(
            Command::new("price")
                .about("Resolve a spot price in the reporting currency")
                .arg(arg!(--provider <PROVIDER>).required(true))
                .arg(arg!(--symbol <SYMBOL>).required(true))
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("doctor")
                .about("Replay paid history against the stored balance")
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("daemon")
                .about("Run the materializer and price refresh on timers")
                .arg(arg!(--once "Run a single pass and exit")),
        )
}
