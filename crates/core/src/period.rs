// SPDX-License-Identifier: MIT

//! DHIS2 fixed-period calendar math.
//!
//! Period identifiers are the DHIS2 wire forms: `20240115` (daily),
//! `2024W5` (ISO weekly), `202401` (monthly), `202401B` (bi-monthly,
//! first month of the pair), `2024Q1`, `2024S1`, `2024` (yearly).

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from period parsing and expansion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("invalid period id: {0}")]
    Invalid(String),
    #[error("empty period selection")]
    EmptySelection,
}

/// Period type of a data item configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
    BiMonthly,
    Quarterly,
    SixMonthly,
    Yearly,
}

/// A concrete fixed period: identifier plus inclusive date interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub id: String,
    pub period_type: PeriodType,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

fn ymd(year: i32, month: u32, day: u32, id: &str) -> Result<NaiveDate, PeriodError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| PeriodError::Invalid(id.to_string()))
}

fn month_end(year: i32, month: u32, id: &str) -> Result<NaiveDate, PeriodError> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    ymd(next_year, next_month, 1, id)?
        .pred_opt()
        .ok_or_else(|| PeriodError::Invalid(id.to_string()))
}

impl Period {
    /// Parse a period identifier, inferring its type from the shape.
    pub fn parse(id: &str) -> Result<Self, PeriodError> {
        let invalid = || PeriodError::Invalid(id.to_string());

        if let Some((year, rest)) = split_marker(id, 'W') {
            let week: u32 = rest.parse().map_err(|_| invalid())?;
            let start =
                NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(invalid)?;
            let end = start.checked_add_days(Days::new(6)).ok_or_else(invalid)?;
            return Ok(Self {
                id: id.to_string(),
                period_type: PeriodType::Weekly,
                start,
                end,
            });
        }
        if let Some((year, rest)) = split_marker(id, 'Q') {
            let quarter: u32 = rest.parse().map_err(|_| invalid())?;
            if !(1..=4).contains(&quarter) {
                return Err(invalid());
            }
            let first_month = (quarter - 1) * 3 + 1;
            return Ok(Self {
                id: id.to_string(),
                period_type: PeriodType::Quarterly,
                start: ymd(year, first_month, 1, id)?,
                end: month_end(year, first_month + 2, id)?,
            });
        }
        if let Some((year, rest)) = split_marker(id, 'S') {
            let half: u32 = rest.parse().map_err(|_| invalid())?;
            if !(1..=2).contains(&half) {
                return Err(invalid());
            }
            let first_month = if half == 1 { 1 } else { 7 };
            return Ok(Self {
                id: id.to_string(),
                period_type: PeriodType::SixMonthly,
                start: ymd(year, first_month, 1, id)?,
                end: month_end(year, first_month + 5, id)?,
            });
        }
        if let Some(digits) = id.strip_suffix('B') {
            if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            let year: i32 = digits[..4].parse().map_err(|_| invalid())?;
            let month: u32 = digits[4..].parse().map_err(|_| invalid())?;
            if month % 2 == 0 || month > 11 {
                return Err(invalid());
            }
            return Ok(Self {
                id: id.to_string(),
                period_type: PeriodType::BiMonthly,
                start: ymd(year, month, 1, id)?,
                end: month_end(year, month + 1, id)?,
            });
        }

        if !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        match id.len() {
            4 => {
                let year: i32 = id.parse().map_err(|_| invalid())?;
                Ok(Self {
                    id: id.to_string(),
                    period_type: PeriodType::Yearly,
                    start: ymd(year, 1, 1, id)?,
                    end: ymd(year, 12, 31, id)?,
                })
            }
            6 => {
                let year: i32 = id[..4].parse().map_err(|_| invalid())?;
                let month: u32 = id[4..].parse().map_err(|_| invalid())?;
                Ok(Self {
                    id: id.to_string(),
                    period_type: PeriodType::Monthly,
                    start: ymd(year, month, 1, id)?,
                    end: month_end(year, month, id)?,
                })
            }
            8 => {
                let year: i32 = id[..4].parse().map_err(|_| invalid())?;
                let month: u32 = id[4..6].parse().map_err(|_| invalid())?;
                let day: u32 = id[6..].parse().map_err(|_| invalid())?;
                let date = ymd(year, month, day, id)?;
                Ok(Self {
                    id: id.to_string(),
                    period_type: PeriodType::Daily,
                    start: date,
                    end: date,
                })
            }
            _ => Err(invalid()),
        }
    }
}

fn split_marker(id: &str, marker: char) -> Option<(i32, &str)> {
    let (year_part, rest) = id.split_once(marker)?;
    if year_part.len() != 4 || rest.is_empty() {
        return None;
    }
    let year: i32 = year_part.parse().ok()?;
    Some((year, rest))
}

impl PeriodType {
    /// Generate all fixed periods of this type whose interval is strictly
    /// engulfed by `[start, end]` (inclusive on both ends), in chronological
    /// order.
    pub fn generate_within(&self, start: NaiveDate, end: NaiveDate) -> Vec<Period> {
        let mut periods = Vec::new();
        for year in start.year()..=end.year() {
            periods.extend(self.generate_year(year));
        }
        // Weekly periods can straddle year boundaries; widen by one year on
        // each side so boundary weeks are considered, then filter.
        if *self == PeriodType::Weekly {
            periods.splice(0..0, self.generate_year(start.year() - 1));
            periods.extend(self.generate_year(end.year() + 1));
        }
        let mut engulfed: Vec<Period> = periods
            .into_iter()
            .filter(|p| p.start >= start && p.end <= end)
            .collect();
        engulfed.sort_by_key(|p| p.start);
        engulfed.dedup_by(|a, b| a.id == b.id);
        engulfed
    }

    fn generate_year(&self, year: i32) -> Vec<Period> {
        let ids: Vec<String> = match self {
            PeriodType::Daily => {
                let mut ids = Vec::new();
                let mut date = NaiveDate::from_ymd_opt(year, 1, 1);
                while let Some(d) = date {
                    if d.year() != year {
                        break;
                    }
                    ids.push(format!("{:04}{:02}{:02}", d.year(), d.month(), d.day()));
                    date = d.succ_opt();
                }
                ids
            }
            PeriodType::Weekly => {
                // ISO years have 52 or 53 weeks; invalid week numbers fail
                // parsing and are skipped.
                (1..=53).map(|w| format!("{year}W{w}")).collect()
            }
            PeriodType::Monthly => (1..=12).map(|m| format!("{year}{m:02}")).collect(),
            PeriodType::BiMonthly => (0..6).map(|i| format!("{year}{:02}B", i * 2 + 1)).collect(),
            PeriodType::Quarterly => (1..=4).map(|q| format!("{year}Q{q}")).collect(),
            PeriodType::SixMonthly => (1..=2).map(|s| format!("{year}S{s}")).collect(),
            PeriodType::Yearly => vec![format!("{year}")],
        };
        ids.iter().filter_map(|id| Period::parse(id).ok()).collect()
    }
}

/// Overall interval spanned by a set of period identifiers: the earliest
/// start to the latest end across all of them.
pub fn spanned_interval(ids: &[String]) -> Result<(NaiveDate, NaiveDate), PeriodError> {
    let mut interval: Option<(NaiveDate, NaiveDate)> = None;
    for id in ids {
        let period = Period::parse(id)?;
        interval = Some(match interval {
            None => (period.start, period.end),
            Some((start, end)) => (start.min(period.start), end.max(period.end)),
        });
    }
    interval.ok_or(PeriodError::EmptySelection)
}

#[cfg(test)]
#[path = "period_tests.rs"]
mod tests;
