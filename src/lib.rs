// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod budget;
pub mod cli;
pub mod commands;
pub mod config;
pub mod cycle;
pub mod db;
pub mod errors;
pub mod goals;
pub mod ledger;
pub mod models;
pub mod portfolio;
pub mod pricing;
pub mod recurring;
pub mod scheduler;
pub mod settlement;
pub mod store;
pub mod transactions;
pub mod utils;

pub use errors::{LedgerError, LedgerResult};

/// Process-wide setup: structured logging to stderr.
pub fn init() {
    utils::init_tracing();
}
