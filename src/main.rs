// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use std::path::PathBuf;

use paycycle::commands::{self, Session};
use paycycle::{cli, config, db};

fn main() -> Result<()> {
    paycycle::init();
    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let paths = config::app_paths(matches.get_one::<String>("home").map(PathBuf::from))?;
    let cfg = config::load_or_init_config(&paths)?;
    let conn = db::open_or_init(&paths)?;
    let user = config::resolve_user(matches.get_one::<String>("user").map(String::as_str), &cfg);
    let mut s = Session {
        conn,
        user,
        cfg,
        db_path: paths.db_file(),
    };

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Config at {}", paths.config_file().display());
            println!("Database initialized at {}", paths.db_file().display());
        }
        Some(("settings", sub)) => commands::settings::handle(&mut s, sub)?,
        Some(("cycle", sub)) => commands::settings::handle_cycle(&s, sub)?,
        Some(("tx", sub)) => commands::transactions::handle(&mut s, sub)?,
        Some(("recurring", sub)) => commands::recurring::handle(&mut s, sub)?,
        Some(("installment", sub)) => commands::recurring::handle_installment(&mut s, sub)?,
        Some(("card", sub)) => commands::cards::handle(&mut s, sub)?,
        Some(("goal", sub)) => commands::goals::handle(&mut s, sub)?,
        Some(("budget", sub)) => commands::budgets::handle(&s, sub)?,
        Some(("invest", sub)) => commands::portfolio::handle(&mut s, sub)?,
        Some(("price", sub)) => commands::portfolio::handle_price(&s, sub)?,
        Some(("doctor", sub)) => commands::doctor::handle(&s.conn, &s.user, sub)?,
        Some(("daemon", sub)) => commands::daemon::handle(&mut s, sub)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
