// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::LedgerError;

/// The one timestamp type the engine works with. Conversion to and from
/// storage lives in `db`.
pub type Instant = DateTime<Utc>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Income,
    Expense,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Income => "income",
            TxKind::Expense => "expense",
        }
    }

    /// Balance effect of settling `amount` of this kind.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            TxKind::Income => amount,
            TxKind::Expense => -amount,
        }
    }
}

impl FromStr for TxKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(TxKind::Income),
            "expense" => Ok(TxKind::Expense),
            other => Err(LedgerError::validation(format!(
                "unknown transaction kind '{other}'"
            ))),
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub description: String,
    pub amount: Decimal,
    pub category: String,
    pub kind: TxKind,
    pub created_at: Instant,
    pub due_date: Option<NaiveDate>,
    pub is_paid: bool,
    pub is_recurring: bool,
    pub is_installment: bool,
    pub installment_group_id: Option<String>,
    pub template_id: Option<String>,
    pub occurrence_date: Option<NaiveDate>,
}

impl Transaction {
    /// Date used to place the transaction inside a cycle.
    pub fn effective_date(&self) -> NaiveDate {
        self.due_date.unwrap_or_else(|| self.created_at.date_naive())
    }

    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed(self.amount)
    }
}

/// Input for a new transaction; ids and timestamps are assigned on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub description: String,
    pub amount: Decimal,
    pub category: String,
    pub kind: TxKind,
    pub due_date: Option<NaiveDate>,
    pub is_paid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub payment_day: u32,
    pub account_balance: Decimal,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCard {
    pub id: String,
    pub name: String,
    pub limit: Decimal,
    pub statement_day: u32,
    pub payment_due_day: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    pub id: String,
    pub card_id: String,
    pub description: String,
    pub amount: Decimal,
    pub category: String,
    pub created_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentHistoryEntry {
    pub id: String,
    pub card_id: String,
    pub description: String,
    pub amount: Decimal,
    pub paid_at: Instant,
    pub is_partial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub target_amount: Decimal,
    pub current_amount: Decimal,
    pub target_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsEntry {
    pub id: String,
    pub goal_id: String,
    pub amount: Decimal,
    pub created_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceProvider {
    Manual,
    Crypto,
    Forex,
    Metals,
}

impl PriceProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceProvider::Manual => "manual",
            PriceProvider::Crypto => "crypto",
            PriceProvider::Forex => "forex",
            PriceProvider::Metals => "metals",
        }
    }
}

impl FromStr for PriceProvider {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(PriceProvider::Manual),
            "crypto" | "coingecko" => Ok(PriceProvider::Crypto),
            "forex" | "fx" | "currency" => Ok(PriceProvider::Forex),
            "metals" | "metal" | "gold" => Ok(PriceProvider::Metals),
            other => Err(LedgerError::validation(format!(
                "unknown price provider '{other}'"
            ))),
        }
    }
}

impl fmt::Display for PriceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub id: String,
    pub asset_name: String,
    pub asset_type: String,
    pub quantity: Decimal,
    pub purchase_price: Decimal,
    pub current_price: Decimal,
    pub symbol: Option<String>,
    pub price_provider: PriceProvider,
    pub auto_update: bool,
    pub updated_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub investment_id: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub executed_at: Instant,
    pub realized_pnl: Decimal,
}
