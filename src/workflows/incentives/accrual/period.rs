use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Named calendar bucket sizes for accrual runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Monthly,
    Quarterly,
    Annual,
}

impl PeriodType {
    pub const fn label(self) -> &'static str {
        match self {
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
            PeriodType::Annual => "annual",
        }
    }
}

/// How a batch run names its period: a calendar bucket around a reference
/// date, or explicit bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodSpec {
    Named {
        period: PeriodType,
        reference: NaiveDate,
    },
    Explicit {
        start: NaiveDate,
        end: NaiveDate,
    },
}

/// Resolved inclusive period bounds. The start date doubles as the accrual
/// row key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, thiserror::Error)]
pub enum PeriodError {
    #[error("period end {end} precedes start {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    #[error("calendar bounds out of range for reference date {reference}")]
    OutOfRange { reference: NaiveDate },
}

impl PeriodSpec {
    pub fn resolve(&self) -> Result<AccrualPeriod, PeriodError> {
        match self {
            PeriodSpec::Explicit { start, end } => {
                if end < start {
                    return Err(PeriodError::EndBeforeStart {
                        start: *start,
                        end: *end,
                    });
                }
                Ok(AccrualPeriod {
                    start: *start,
                    end: *end,
                })
            }
            PeriodSpec::Named { period, reference } => period.containing(*reference),
        }
    }
}

impl PeriodType {
    /// Calendar bucket containing the reference date: first to last day of
    /// the month, the 3-month block aligned to month index divisible by 3,
    /// or the calendar year.
    pub fn containing(self, reference: NaiveDate) -> Result<AccrualPeriod, PeriodError> {
        let year = reference.year();
        let out_of_range = || PeriodError::OutOfRange { reference };

        let (start_month, end_exclusive) = match self {
            PeriodType::Monthly => {
                let month = reference.month();
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)
                };
                (month, next)
            }
            PeriodType::Quarterly => {
                let quarter_start = ((reference.month() - 1) / 3) * 3 + 1;
                let next = if quarter_start == 10 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year, quarter_start + 3, 1)
                };
                (quarter_start, next)
            }
            PeriodType::Annual => (1, NaiveDate::from_ymd_opt(year + 1, 1, 1)),
        };

        let start = NaiveDate::from_ymd_opt(year, start_month, 1).ok_or_else(out_of_range)?;
        let end = end_exclusive
            .and_then(|date| date.checked_sub_days(Days::new(1)))
            .ok_or_else(out_of_range)?;

        Ok(AccrualPeriod { start, end })
    }
}
