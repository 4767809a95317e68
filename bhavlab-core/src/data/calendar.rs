//! Trading-calendar gate.
//!
//! A date is a session when it is a weekday and not a listed holiday. The
//! holiday list comes from an external source (the exchange's holiday-master
//! endpoint, or a static list); if that source fails the calendar degrades to
//! weekday-only logic so that a lookup outage never blocks acquisition.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum HolidayError {
    #[error("holiday request failed: {0}")]
    Request(String),

    #[error("holiday response was not understood: {0}")]
    Format(String),
}

/// Supplies market holiday dates.
pub trait HolidaySource {
    fn holidays(&self) -> Result<BTreeSet<NaiveDate>, HolidayError>;
}

/// A fixed holiday list (from configuration or tests).
#[derive(Debug, Clone, Default)]
pub struct StaticHolidays(pub BTreeSet<NaiveDate>);

impl StaticHolidays {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self(dates.into_iter().collect())
    }
}

impl HolidaySource for StaticHolidays {
    fn holidays(&self) -> Result<BTreeSet<NaiveDate>, HolidayError> {
        Ok(self.0.clone())
    }
}

/// Exchange holiday-master endpoint.
///
/// The payload is an object of segment arrays, each item carrying a
/// `tradingDate` (or `date`) string in `%d-%b-%Y` form. Items that don't
/// parse are skipped.
pub struct RemoteHolidays {
    client: reqwest::blocking::Client,
    url: String,
}

impl RemoteHolidays {
    pub fn new(url: impl Into<String>, timeout: std::time::Duration) -> Result<Self, HolidayError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| HolidayError::Request(format!("client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl HolidaySource for RemoteHolidays {
    fn holidays(&self) -> Result<BTreeSet<NaiveDate>, HolidayError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| HolidayError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(HolidayError::Request(format!("HTTP {}", resp.status())));
        }
        let body: Value = resp
            .json()
            .map_err(|e| HolidayError::Format(e.to_string()))?;
        parse_holiday_master(&body)
    }
}

/// Extract holiday dates from a holiday-master JSON document.
pub fn parse_holiday_master(body: &Value) -> Result<BTreeSet<NaiveDate>, HolidayError> {
    let segments = body
        .as_object()
        .ok_or_else(|| HolidayError::Format("expected a JSON object".into()))?;

    let mut dates = BTreeSet::new();
    for items in segments.values().filter_map(Value::as_array) {
        for item in items {
            let raw = item
                .get("tradingDate")
                .or_else(|| item.get("date"))
                .and_then(Value::as_str);
            if let Some(date) = raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%d-%b-%Y").ok()) {
                dates.insert(date);
            }
        }
    }
    Ok(dates)
}

/// Session gate used by the location generator.
#[derive(Debug, Clone, Default)]
pub struct TradingCalendar {
    holidays: BTreeSet<NaiveDate>,
    degraded: bool,
}

impl TradingCalendar {
    /// Build from a holiday source, falling back to weekday-only on failure.
    pub fn load(source: &dyn HolidaySource) -> Self {
        match source.holidays() {
            Ok(holidays) => {
                debug!(count = holidays.len(), "loaded market holidays");
                Self {
                    holidays,
                    degraded: false,
                }
            }
            Err(e) => {
                warn!(error = %e, "holiday lookup failed, using weekday-only calendar");
                Self {
                    holidays: BTreeSet::new(),
                    degraded: true,
                }
            }
        }
    }

    /// Weekdays are sessions, no holidays.
    pub fn weekdays_only() -> Self {
        Self::default()
    }

    pub fn with_holidays(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
            degraded: false,
        }
    }

    /// Add fixed holidays on top of whatever was loaded. A degraded calendar
    /// stays degraded.
    pub fn with_extra_holidays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(dates);
        self
    }

    /// True when the holiday source failed and only weekends are excluded.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn is_session(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    /// Most recent session strictly before `date`, searching at most `max_days` back.
    pub fn previous_session(&self, date: NaiveDate, max_days: u32) -> Option<NaiveDate> {
        (1..=i64::from(max_days))
            .map(|i| date - Duration::days(i))
            .find(|d| self.is_session(*d))
    }
}
