//! Property tests for delta and classifier invariants.
//!
//! Uses proptest to verify:
//! 1. `diff(S, None)` marks every record history-less with zero percentages
//! 2. `diff(S, S)` yields zero change for every tracked metric
//! 3. Deltas are 1:1 with current records, in order
//! 4. A feature sitting exactly on a threshold never leaves HOLD

use bhavlab_core::domain::{CanonicalRecord, InstrumentKeywords, Snapshot};
use bhavlab_runner::{
    diff, Action, Features, Momentum, SignalClassifier, SignalSettings, TRACKED_METRICS,
};
use chrono::NaiveDate;
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_metric() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![
        1 => Just(None),
        1 => Just(Some(0.0)),
        4 => (-1.0e6..1.0e6_f64).prop_map(|v| Some((v * 100.0).round() / 100.0)),
    ]
}

fn arb_record() -> impl Strategy<Value = CanonicalRecord> {
    (
        "[A-Z]{1,4}",
        prop::sample::select(vec!["FUTSTK", "OPTIDX", "IDF", "STO"]),
        prop::option::of(prop::sample::select(vec!["CE", "PE"])),
        prop::option::of(0u32..5000),
        (arb_metric(), arb_metric(), arb_metric()),
        (arb_metric(), arb_metric(), arb_metric()),
        arb_metric(),
    )
        .prop_map(|(symbol, kind, opt, strike, (oi, vol, val), (ltp, close, settle), chg)| {
            CanonicalRecord {
                symbol: Some(symbol),
                instrument_type: Some(kind.to_string()),
                expiry: Some("2024-11-28".into()),
                strike: strike.map(f64::from),
                option_type: opt.map(String::from),
                open_interest: oi,
                change_in_oi: chg,
                volume: vol,
                traded_value: val,
                last_price: ltp,
                close_price: close,
                settlement_price: settle,
                ..Default::default()
            }
        })
}

fn arb_snapshot() -> impl Strategy<Value = Snapshot> {
    prop::collection::vec(arb_record(), 0..30).prop_map(|records| {
        // contract identities are unique within a snapshot
        let mut seen = std::collections::HashSet::new();
        let records = records.into_iter().filter(|r| seen.insert(r.key())).collect();
        Snapshot::new(NaiveDate::from_ymd_opt(2024, 11, 15).unwrap(), records)
    })
}

// ── 1–3. Delta calculator ────────────────────────────────────────────

proptest! {
    #[test]
    fn diff_without_previous_has_no_history(snapshot in arb_snapshot()) {
        let deltas = diff(&snapshot, None);
        prop_assert_eq!(deltas.len(), snapshot.len());
        for (delta, record) in deltas.iter().zip(&snapshot.records) {
            prop_assert!(!delta.has_history);
            prop_assert_eq!(&delta.key, &record.key());
            for field in TRACKED_METRICS {
                let metric = delta.metric(field).unwrap();
                prop_assert_eq!(metric.percentage, 0.0);
                prop_assert_eq!(metric.previous, None);
            }
        }
    }

    #[test]
    fn diff_against_itself_is_zero(snapshot in arb_snapshot()) {
        let deltas = diff(&snapshot, Some(&snapshot));
        prop_assert_eq!(deltas.len(), snapshot.len());
        for delta in &deltas {
            prop_assert!(delta.has_history);
            for field in TRACKED_METRICS {
                let metric = delta.metric(field).unwrap();
                prop_assert_eq!(metric.absolute, 0.0);
                prop_assert_eq!(metric.percentage, 0.0);
                prop_assert_eq!(metric.current, metric.previous);
            }
        }
    }
}

// ── 4. Classifier boundary ───────────────────────────────────────────

proptest! {
    /// With one feature pinned to its threshold, no other feature values can
    /// produce BUY or SELL through that threshold.
    #[test]
    fn exact_thresholds_stay_neutral(
        other in 2.0001..1000.0_f64,
        spike in prop::option::of(0.0..10.0_f64),
    ) {
        let settings = SignalSettings::default();
        let t = settings.thresholds.clone();
        let classifier = SignalClassifier::new(settings, InstrumentKeywords::default());

        let cases = [
            (t.buy_return_pct, other, Momentum::Up),
            (other, t.buy_oi_pct, Momentum::Up),
            (t.sell_return_pct, -other, Momentum::Down),
            (-other, t.sell_oi_pct, Momentum::Down),
        ];
        for (ret, oi, momentum) in cases {
            let features = Features {
                price_return_pct: ret,
                oi_change_pct: oi,
                momentum,
                volume_spike: spike,
            };
            prop_assert_eq!(classifier.action(&features), Action::Hold);
        }
    }
}
