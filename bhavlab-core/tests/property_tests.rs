//! Property tests for acquisition invariants.
//!
//! Uses proptest to verify:
//! 1. Calendar gate: no candidate is ever emitted for a non-session date
//! 2. Candidate ordering: newer dates first, raw before archive within a date
//! 3. Delimiter inference is a pure function of the text
//! 4. Normalizer coverage: every canonical field is present for any header set

use bhavlab_core::data::{
    default_patterns, normalize, sniff::detect_delimiter, FilenamePattern, FormatKind,
    LocationGenerator, ParseStrategy, RawTable, SchemaSettings, TradingCalendar,
};
use bhavlab_core::domain::CanonicalField;
use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0i64..3650).prop_map(|offset| NaiveDate::from_ymd_opt(2016, 1, 1).unwrap() + Duration::days(offset))
}

fn arb_calendar() -> impl Strategy<Value = TradingCalendar> {
    prop::collection::vec(arb_date(), 0..40).prop_map(|holidays| TradingCalendar::with_holidays(holidays))
}

fn arb_patterns() -> impl Strategy<Value = Vec<FilenamePattern>> {
    prop::collection::vec(
        (any::<bool>(), "[a-z]{1,6}").prop_map(|(archive, stem)| {
            if archive {
                FilenamePattern::archive(format!("{stem}{{dd}}{{MMM}}{{yyyy}}.zip"))
            } else {
                FilenamePattern::raw(format!("{stem}{{yyyy}}{{MM}}{{dd}}.csv"))
            }
        }),
        1..6,
    )
}

fn arb_sample_text() -> impl Strategy<Value = String> {
    prop::collection::vec("[A-Za-z0-9 |,;\t^~.]{0,40}", 0..25).prop_map(|lines| lines.join("\n"))
}

fn header_pool() -> Vec<&'static str> {
    vec![
        "SYMBOL", "TckrSymb", "INSTRUMENT", "EXPIRY_DT", "STRIKE_PR", "OPTION_TYP", "OPEN_INT",
        "CHG_IN_OI", "CONTRACTS", "VAL_INLAKH", "LTP", "CLOSE", "PREV_CLOSE", "SETTLE_PR",
        "TIMESTAMP", "UNKNOWN_COL", "Rsvd1",
    ]
}

fn arb_table() -> impl Strategy<Value = RawTable> {
    let headers = prop::sample::subsequence(header_pool(), 1..10);
    headers.prop_flat_map(|headers| {
        let width = headers.len();
        let rows = prop::collection::vec(
            prop::collection::vec("[A-Z0-9.,-]{0,8}", width..=width),
            0..8,
        );
        (Just(headers), rows)
    })
    .prop_map(|(headers, rows)| RawTable {
        headers: headers.into_iter().map(String::from).collect(),
        rows,
        strategy: ParseStrategy::Delimited(','),
    })
}

// ── 1 + 2. Candidate generation ──────────────────────────────────────

proptest! {
    /// Every emitted candidate falls on a session inside the lookback window.
    #[test]
    fn candidates_only_fall_on_sessions(
        calendar in arb_calendar(),
        start in arb_date(),
        lookback in 0u32..20,
    ) {
        let generator = LocationGenerator::new("https://host.test/", &default_patterns());
        for candidate in generator.candidates(&calendar, start, lookback) {
            prop_assert!(calendar.is_session(candidate.date));
            prop_assert!(candidate.date <= start);
            prop_assert!(start - candidate.date < Duration::days(i64::from(lookback)));
        }
    }

    /// Dates never increase; within a date, raw candidates precede archives.
    #[test]
    fn candidates_are_ordered(
        calendar in arb_calendar(),
        patterns in arb_patterns(),
        start in arb_date(),
        lookback in 1u32..15,
    ) {
        let generator = LocationGenerator::new("https://host.test", &patterns);
        let candidates: Vec<_> = generator.candidates(&calendar, start, lookback).collect();

        for pair in candidates.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.date >= b.date);
            if a.date == b.date {
                prop_assert!(!(a.kind == FormatKind::Archive && b.kind == FormatKind::RawTabular));
            }
        }

        let sessions = (0..lookback)
            .map(|d| start - Duration::days(i64::from(d)))
            .filter(|d| calendar.is_session(*d))
            .count();
        prop_assert_eq!(candidates.len(), sessions * patterns.len());
    }
}

// ── 3. Delimiter determinism ─────────────────────────────────────────

proptest! {
    #[test]
    fn delimiter_choice_is_deterministic(text in arb_sample_text()) {
        let candidates = ['|', ',', '\t', '^', '~', ';'];
        let first = detect_delimiter(&text, &candidates, 20);
        for _ in 0..3 {
            prop_assert_eq!(detect_delimiter(&text, &candidates, 20), first);
        }
        if let Some(delim) = first {
            prop_assert!(text.contains(delim));
        }
    }
}

// ── 4. Normalizer coverage ───────────────────────────────────────────

proptest! {
    /// Whatever columns exist, fields without a source column are null and
    /// the record shape never changes.
    #[test]
    fn normalizer_covers_every_field(table in arb_table()) {
        let schema = SchemaSettings::default();
        let date = NaiveDate::from_ymd_opt(2024, 11, 15).unwrap();
        let snapshot = normalize(&table, date, &schema);

        prop_assert_eq!(snapshot.session_date, date);
        prop_assert!(snapshot.len() <= table.len());

        for field in CanonicalField::ALL {
            let mapped = schema
                .aliases_for(field)
                .iter()
                .any(|alias| table.column_index(alias).is_some());
            if mapped {
                continue;
            }
            for record in &snapshot.records {
                prop_assert!(record.text(field).is_none());
                prop_assert!(record.number(field).is_none());
            }
        }

        let keys: std::collections::HashSet<_> = snapshot.records.iter().map(|r| r.key()).collect();
        prop_assert_eq!(keys.len(), snapshot.len());
    }
}
