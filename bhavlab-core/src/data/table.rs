//! Tabular parser.
//!
//! Turns sniffed text into a header + rows table. Strategies are tried in a
//! fixed order, each only when the previous one fails:
//!
//! 1. strict delimited parse with the sniffed delimiter
//! 2. consistency sniffing over a sample of lines, then a lenient parse
//! 3. fixed-width columns inferred from blank character positions
//! 4. whitespace tokenization with positional column names
//!
//! The last strategy cannot fail on non-empty text, so the ladder only errors
//! when there is nothing to parse.

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Delimiters examined by the consistency sniffer, in tie-break order.
const SNIFF_CANDIDATES: [char; 7] = [',', ';', '\t', '|', ':', '^', '~'];

#[derive(Debug, Error)]
pub enum TableError {
    #[error("no text to parse")]
    Empty,

    #[error("{strategy} parse failed: {reason}")]
    Strategy {
        strategy: &'static str,
        reason: String,
    },
}

impl TableError {
    fn strategy(strategy: &'static str, reason: impl Into<String>) -> Self {
        TableError::Strategy {
            strategy,
            reason: reason.into(),
        }
    }
}

/// Which rung of the ladder produced a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseStrategy {
    Delimited(char),
    Sniffed(char),
    FixedWidth,
    Whitespace,
}

impl fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseStrategy::Delimited(c) => write!(f, "delimited({})", c.escape_default()),
            ParseStrategy::Sniffed(c) => write!(f, "sniffed({})", c.escape_default()),
            ParseStrategy::FixedWidth => f.write_str("fixed-width"),
            ParseStrategy::Whitespace => f.write_str("whitespace"),
        }
    }
}

/// Header row plus data rows of string cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Whitespace-trimmed column names, positional.
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub strategy: ParseStrategy,
}

impl RawTable {
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first header equal to `name`, ignoring ASCII case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.eq_ignore_ascii_case(name))
    }
}

/// Parse `text` into a table, falling back through the strategy ladder.
pub fn parse(text: &str, delimiter: Option<char>, sample_lines: usize) -> Result<RawTable, TableError> {
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return Err(TableError::Empty);
    }

    let attempts: [&dyn Fn() -> Result<RawTable, TableError>; 4] = [
        &|| match delimiter {
            Some(d) => parse_delimited(text, d),
            None => Err(TableError::strategy("delimited", "delimiter undetermined")),
        },
        &|| parse_sniffed(text, sample_lines),
        &|| parse_fixed_width(text, sample_lines),
        &|| Ok(parse_whitespace(text)),
    ];

    let mut last_error = TableError::Empty;
    for attempt in attempts {
        match attempt() {
            Ok(table) => {
                debug!(strategy = %table.strategy, columns = table.width(), rows = table.len(), "parsed table");
                return Ok(table);
            }
            Err(e) => {
                debug!(error = %e, "parse strategy failed, trying next");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

fn trimmed_headers(cells: impl IntoIterator<Item = String>) -> Vec<String> {
    cells
        .into_iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect()
}

fn delimiter_byte(strategy: &'static str, d: char) -> Result<u8, TableError> {
    u8::try_from(d)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| TableError::strategy(strategy, format!("delimiter {d:?} is not ASCII")))
}

/// Strict parse: every row must match the header width.
pub fn parse_delimited(text: &str, delimiter: char) -> Result<RawTable, TableError> {
    const NAME: &str = "delimited";
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter_byte(NAME, delimiter)?)
        .has_headers(false)
        .flexible(false)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header = records
        .next()
        .ok_or_else(|| TableError::strategy(NAME, "no header row"))?
        .map_err(|e| TableError::strategy(NAME, e.to_string()))?;
    if header.len() < 2 {
        return Err(TableError::strategy(NAME, "header has a single column"));
    }

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| TableError::strategy(NAME, e.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable {
        headers: trimmed_headers(header.iter().map(str::to_string)),
        rows,
        strategy: ParseStrategy::Delimited(delimiter),
    })
}

/// Choose the delimiter whose field count matches the header on the most
/// sample lines, then parse leniently.
pub fn parse_sniffed(text: &str, sample_lines: usize) -> Result<RawTable, TableError> {
    const NAME: &str = "sniffed";
    let sample: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(sample_lines.max(1))
        .collect();

    let mut best: Option<(char, usize)> = None;
    for &candidate in &SNIFF_CANDIDATES {
        let counts: Vec<usize> = sample
            .iter()
            .map(|line| field_count(line, candidate))
            .collect();
        let Some(&width) = counts.first() else { continue };
        if width < 2 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == width).count();
        if best.map_or(true, |(_, score)| consistent > score) {
            best = Some((candidate, consistent));
        }
    }

    let (delimiter, _) =
        best.ok_or_else(|| TableError::strategy(NAME, "no delimiter yields more than one column"))?;

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter_byte(NAME, delimiter)?)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header = records
        .next()
        .ok_or_else(|| TableError::strategy(NAME, "no header row"))?
        .map_err(|e| TableError::strategy(NAME, e.to_string()))?;
    let width = header.len();

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| TableError::strategy(NAME, e.to_string()))?;
        let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
        row.resize(width, String::new());
        rows.push(row);
    }

    Ok(RawTable {
        headers: trimmed_headers(header.iter().map(str::to_string)),
        rows,
        strategy: ParseStrategy::Sniffed(delimiter),
    })
}

fn field_count(line: &str, delimiter: char) -> usize {
    let Ok(byte) = delimiter_byte("sniffed", delimiter) else {
        return 0;
    };
    ReaderBuilder::new()
        .delimiter(byte)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(Result::ok)
        .map_or(0, |r| r.len())
}

/// Columns are maximal runs of character positions that are non-blank in at
/// least one sample line.
pub fn parse_fixed_width(text: &str, sample_lines: usize) -> Result<RawTable, TableError> {
    const NAME: &str = "fixed-width";
    let lines: Vec<Vec<char>> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.trim_end().chars().collect())
        .collect();

    let sample = &lines[..lines.len().min(sample_lines.max(1))];
    let max_len = sample.iter().map(Vec::len).max().unwrap_or(0);

    let mut occupied = vec![false; max_len];
    for line in sample {
        for (i, ch) in line.iter().enumerate() {
            if !ch.is_whitespace() {
                occupied[i] = true;
            }
        }
    }

    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut start = None;
    for (i, &filled) in occupied.iter().enumerate() {
        match (filled, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, max_len));
    }
    if spans.len() < 2 {
        return Err(TableError::strategy(NAME, "no blank column separates fields"));
    }

    // the last span runs to end of line so longer rows keep their tail
    let slice = |line: &[char], (from, to): (usize, usize), last: bool| -> String {
        let end = if last { line.len() } else { to.min(line.len()) };
        if from >= end {
            return String::new();
        }
        line[from..end].iter().collect::<String>().trim().to_string()
    };
    let split = |line: &[char]| -> Vec<String> {
        spans
            .iter()
            .enumerate()
            .map(|(i, &span)| slice(line, span, i + 1 == spans.len()))
            .collect()
    };

    let mut iter = lines.iter();
    let header = iter
        .next()
        .map(|l| split(l.as_slice()))
        .ok_or_else(|| TableError::strategy(NAME, "no header row"))?;
    let rows = iter.map(|l| split(l.as_slice())).collect();

    Ok(RawTable {
        headers: trimmed_headers(header),
        rows,
        strategy: ParseStrategy::FixedWidth,
    })
}

/// Last resort: whitespace tokens, rows padded to the widest, columns named
/// `column_1..n`, every line treated as data.
pub fn parse_whitespace(text: &str) -> RawTable {
    let mut rows: Vec<Vec<String>> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split_whitespace().map(str::to_string).collect())
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(width, String::new());
    }

    RawTable {
        headers: (1..=width).map(|i| format!("column_{i}")).collect(),
        rows,
        strategy: ParseStrategy::Whitespace,
    }
}
