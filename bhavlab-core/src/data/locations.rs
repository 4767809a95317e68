//! Candidate location generator.
//!
//! Walks backward from a start date and, for each trading session, yields every
//! raw-tabular pattern before every archive pattern. Filename templates are
//! data: new upstream naming conventions are added to the pattern list, not to
//! this module.

use super::calendar::TradingCalendar;
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Container format a pattern is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// Uncompressed delimited text. Probed first.
    RawTabular,
    /// Compressed archive holding a tabular member.
    Archive,
}

/// A date-formatted filename template relative to the base URL.
///
/// Tokens: `{yyyy}` `{yy}` `{MM}` `{dd}` `{MMM}` (NOV) `{Mmm}` (Nov) `{mmm}` (nov).
/// Anything else between braces is left as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilenamePattern {
    pub template: String,
    pub kind: FormatKind,
}

impl FilenamePattern {
    pub fn raw(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            kind: FormatKind::RawTabular,
        }
    }

    pub fn archive(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            kind: FormatKind::Archive,
        }
    }

    /// Expand the template for a date.
    pub fn render(&self, date: NaiveDate) -> String {
        let month = date.format("%b").to_string();
        let mut out = String::with_capacity(self.template.len() + 8);
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open..];
            let Some(close) = after.find('}') else {
                out.push_str(after);
                rest = "";
                break;
            };
            let token = &after[1..close];
            match token {
                "yyyy" => out.push_str(&format!("{:04}", date.year())),
                "yy" => out.push_str(&format!("{:02}", date.year() % 100)),
                "MM" => out.push_str(&format!("{:02}", date.month())),
                "dd" => out.push_str(&format!("{:02}", date.day())),
                "MMM" => out.push_str(&month.to_uppercase()),
                "Mmm" => out.push_str(&month),
                "mmm" => out.push_str(&month.to_lowercase()),
                _ => out.push_str(&after[..=close]),
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        out
    }
}

/// The built-in NSE F&O pattern table, in probe priority order.
pub fn default_patterns() -> Vec<FilenamePattern> {
    vec![
        FilenamePattern::raw("BhavCopy_NSE_FO_0_0_0_{yyyy}{MM}{dd}_F_0000.csv"),
        FilenamePattern::raw("fo{dd}{MMM}{yyyy}bhav.csv"),
        FilenamePattern::archive("BhavCopy_NSE_FO_0_0_0_{yyyy}{MM}{dd}_F_0000.csv.zip"),
        FilenamePattern::archive("fo{dd}{MMM}{yyyy}bhav.csv.zip"),
    ]
}

/// A fully resolved remote address to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLocation {
    pub date: NaiveDate,
    pub kind: FormatKind,
    pub url: String,
}

impl fmt::Display for CandidateLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {})", self.url, self.kind, self.date)
    }
}

/// Builds candidate locations from a base URL and a pattern table.
#[derive(Debug, Clone)]
pub struct LocationGenerator {
    base_url: String,
    raw: Vec<FilenamePattern>,
    archive: Vec<FilenamePattern>,
}

impl LocationGenerator {
    /// Patterns keep their relative order within each kind.
    pub fn new(base_url: impl Into<String>, patterns: &[FilenamePattern]) -> Self {
        let (raw, archive) = patterns
            .iter()
            .cloned()
            .partition(|p| p.kind == FormatKind::RawTabular);
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            raw,
            archive,
        }
    }

    pub fn url_for(&self, pattern: &FilenamePattern, date: NaiveDate) -> String {
        let path = pattern.render(date);
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Lazily enumerate candidates for `start` and the `max_lookback_days - 1`
    /// calendar days before it, skipping non-sessions.
    pub fn candidates<'a>(
        &'a self,
        calendar: &'a TradingCalendar,
        start: NaiveDate,
        max_lookback_days: u32,
    ) -> Candidates<'a> {
        Candidates {
            generator: self,
            calendar,
            start,
            max_lookback_days,
            day: 0,
            slot: 0,
        }
    }

    fn pattern_at(&self, slot: usize) -> Option<&FilenamePattern> {
        self.raw.get(slot).or_else(|| self.archive.get(slot - self.raw.len()))
    }

    fn patterns_per_day(&self) -> usize {
        self.raw.len() + self.archive.len()
    }
}

/// Iterator returned by [`LocationGenerator::candidates`].
pub struct Candidates<'a> {
    generator: &'a LocationGenerator,
    calendar: &'a TradingCalendar,
    start: NaiveDate,
    max_lookback_days: u32,
    day: u32,
    slot: usize,
}

impl Iterator for Candidates<'_> {
    type Item = CandidateLocation;

    fn next(&mut self) -> Option<Self::Item> {
        let per_day = self.generator.patterns_per_day();
        while self.day < self.max_lookback_days {
            let date = self.start - Duration::days(i64::from(self.day));
            if self.slot >= per_day || !self.calendar.is_session(date) {
                self.day += 1;
                self.slot = 0;
                continue;
            }
            let pattern = self.generator.pattern_at(self.slot)?;
            self.slot += 1;
            return Some(CandidateLocation {
                date,
                kind: pattern.kind,
                url: self.generator.url_for(pattern, date),
            });
        }
        None
    }
}
