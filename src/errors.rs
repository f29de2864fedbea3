// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rust_decimal::Decimal;
use thiserror::Error;

/// Failures surfaced by ledger operations.
///
/// Every variant except `ConcurrencyConflict` and `Persistence` is raised
/// before the store is written.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Decimal, required: Decimal },
    #[error("no price available for {provider}:{symbol}")]
    PriceUnavailable { provider: String, symbol: String },
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
    #[error("ledger changed concurrently; gave up after {attempts} attempts")]
    ConcurrencyConflict { attempts: u32 },
    #[error("storage error: {0}")]
    Persistence(#[from] rusqlite::Error),
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

/// Lifts a checked arithmetic result; `None` means the value overflowed.
pub fn in_range<T>(value: Option<T>) -> LedgerResult<T> {
    value.ok_or_else(LedgerError::out_of_range)
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    pub fn out_of_range() -> Self {
        LedgerError::Validation("amount out of range".into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for store errors that a fresh attempt may resolve.
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Persistence(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
