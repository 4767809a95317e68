//! Delta calculator: joins the current snapshot to the previous one by full
//! contract identity and derives per-metric changes.

use bhavlab_core::domain::{CanonicalField, CanonicalRecord, ContractKey, Snapshot};
use serde::{Deserialize, Serialize};

/// Metrics carried on every [`DeltaRecord`].
pub const TRACKED_METRICS: [CanonicalField; 6] = [
    CanonicalField::OpenInterest,
    CanonicalField::Volume,
    CanonicalField::TradedValue,
    CanonicalField::LastPrice,
    CanonicalField::ClosePrice,
    CanonicalField::SettlementPrice,
];

/// Change in one metric between two sessions.
///
/// `current` and `previous` keep nulls visible; `absolute` and `percentage`
/// are always defined (0 when a side is missing or the base is zero).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub current: Option<f64>,
    pub previous: Option<f64>,
    pub absolute: f64,
    pub percentage: f64,
}

impl MetricDelta {
    /// Both sessions carry the contract.
    pub fn matched(current: Option<f64>, previous: Option<f64>) -> Self {
        let (absolute, percentage) = match (current, previous) {
            (Some(c), Some(p)) => {
                let absolute = c - p;
                (absolute, percent_change(absolute, p))
            }
            _ => (0.0, 0.0),
        };
        Self {
            current,
            previous,
            absolute,
            percentage,
        }
    }

    /// No previous record: the absolute change is whatever the source
    /// reported (or 0) and the percentage is 0.
    pub fn unmatched(current: Option<f64>, reported_change: Option<f64>) -> Self {
        Self {
            current,
            previous: None,
            absolute: reported_change.unwrap_or(0.0),
            percentage: 0.0,
        }
    }
}

/// `absolute / base * 100`, or 0 on a zero base.
pub fn percent_change(absolute: f64, base: f64) -> f64 {
    if base == 0.0 {
        0.0
    } else {
        absolute / base * 100.0
    }
}

/// One current contract paired with its previous-session counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub key: ContractKey,
    pub current: CanonicalRecord,
    pub has_history: bool,
    pub open_interest: MetricDelta,
    pub volume: MetricDelta,
    pub traded_value: MetricDelta,
    pub last_price: MetricDelta,
    pub close_price: MetricDelta,
    pub settlement_price: MetricDelta,
}

impl DeltaRecord {
    fn build(current: &CanonicalRecord, previous: Option<&CanonicalRecord>) -> Self {
        let metric = |field: CanonicalField| match previous {
            Some(prev) => MetricDelta::matched(current.number(field), prev.number(field)),
            None if field == CanonicalField::OpenInterest => {
                MetricDelta::unmatched(current.number(field), current.change_in_oi)
            }
            None => MetricDelta::unmatched(current.number(field), None),
        };
        Self {
            key: current.key(),
            current: current.clone(),
            has_history: previous.is_some(),
            open_interest: metric(CanonicalField::OpenInterest),
            volume: metric(CanonicalField::Volume),
            traded_value: metric(CanonicalField::TradedValue),
            last_price: metric(CanonicalField::LastPrice),
            close_price: metric(CanonicalField::ClosePrice),
            settlement_price: metric(CanonicalField::SettlementPrice),
        }
    }

    /// Delta for a tracked metric; `None` for untracked fields.
    pub fn metric(&self, field: CanonicalField) -> Option<&MetricDelta> {
        match field {
            CanonicalField::OpenInterest => Some(&self.open_interest),
            CanonicalField::Volume => Some(&self.volume),
            CanonicalField::TradedValue => Some(&self.traded_value),
            CanonicalField::LastPrice => Some(&self.last_price),
            CanonicalField::ClosePrice => Some(&self.close_price),
            CanonicalField::SettlementPrice => Some(&self.settlement_price),
            _ => None,
        }
    }
}

/// One delta per current record, in current-snapshot order.
pub fn diff(current: &Snapshot, previous: Option<&Snapshot>) -> Vec<DeltaRecord> {
    let index = previous.map(Snapshot::index).unwrap_or_default();
    current
        .records
        .iter()
        .map(|record| DeltaRecord::build(record, index.get(&record.key()).copied()))
        .collect()
}
