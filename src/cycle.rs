// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Financial cycle windows anchored to a payment day.
//!
//! Payment days are restricted to 1..=28 so every month contains the anchor.
//! This is a deliberate limitation, not a general calendar.

use chrono::{Datelike, Months, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::errors::{LedgerError, LedgerResult};
use crate::models::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cycle {
    pub start: NaiveDate,
    /// Inclusive last day of the cycle.
    pub end: NaiveDate,
}

impl Cycle {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn start_instant(&self) -> Instant {
        Utc.from_utc_datetime(&self.start.and_time(chrono::NaiveTime::MIN))
    }

    /// Last representable instant of the end day.
    pub fn end_instant(&self) -> Instant {
        let last = self
            .end
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap_or_else(|| self.end.and_time(chrono::NaiveTime::MIN));
        Utc.from_utc_datetime(&last)
    }
}

pub fn validate_payment_day(payment_day: u32) -> LedgerResult<()> {
    if (1..=28).contains(&payment_day) {
        Ok(())
    } else {
        Err(LedgerError::validation(format!(
            "payment day must be between 1 and 28, got {payment_day}"
        )))
    }
}

fn anchored(year: i32, month: u32, day: u32) -> LedgerResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| LedgerError::validation(format!("no date {year}-{month}-{day}")))
}

fn cycle_from_start(start: NaiveDate) -> LedgerResult<Cycle> {
    let next = start
        .checked_add_months(Months::new(1))
        .ok_or_else(|| LedgerError::validation("cycle end out of range"))?;
    let end = next
        .pred_opt()
        .ok_or_else(|| LedgerError::validation("cycle end out of range"))?;
    Ok(Cycle { start, end })
}

/// The cycle containing `today`.
pub fn current_cycle(payment_day: u32, today: NaiveDate) -> LedgerResult<Cycle> {
    validate_payment_day(payment_day)?;
    let this_month = anchored(today.year(), today.month(), payment_day)?;
    let start = if today.day() >= payment_day {
        this_month
    } else {
        this_month
            .checked_sub_months(Months::new(1))
            .ok_or_else(|| LedgerError::validation("cycle start out of range"))?
    };
    cycle_from_start(start)
}

/// The cycle immediately before the one containing `today`.
pub fn previous_cycle(payment_day: u32, today: NaiveDate) -> LedgerResult<Cycle> {
    let current = current_cycle(payment_day, today)?;
    let start = current
        .start
        .checked_sub_months(Months::new(1))
        .ok_or_else(|| LedgerError::validation("cycle start out of range"))?;
    let end = current
        .start
        .pred_opt()
        .ok_or_else(|| LedgerError::validation("cycle end out of range"))?;
    Ok(Cycle { start, end })
}
