// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use tracing::info;

use super::Session;
use super::portfolio::resolver;
use crate::scheduler::{BackgroundWorker, run_once};

pub fn handle(s: &mut Session, m: &clap::ArgMatches) -> Result<()> {
    let pricer = resolver(s)?;
    if m.get_flag("once") {
        let report = run_once(&mut s.conn, &s.user, &pricer);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let worker = BackgroundWorker::spawn(s.db_path.clone(), s.user.clone(), pricer, s.policy())?;
    info!(user = %s.user, "daemon running; press Enter to stop");
    // Any line or EOF on stdin stops the worker.
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    worker.stop();
    Ok(())
}
