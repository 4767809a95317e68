//! Derived features for the signal classifier.

use crate::delta::{percent_change, DeltaRecord};
use bhavlab_core::domain::{ContractKey, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Direction of the session's close against the reported previous close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Momentum {
    Up,
    Down,
    Flat,
}

impl fmt::Display for Momentum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Momentum::Up => "UP",
            Momentum::Down => "DOWN",
            Momentum::Flat => "FLAT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Features {
    /// Price change in percent.
    pub price_return_pct: f64,
    /// Open-interest change in percent.
    pub oi_change_pct: f64,
    pub momentum: Momentum,
    /// Current volume over the trailing average; `None` without a baseline.
    pub volume_spike: Option<f64>,
}

impl Features {
    /// Compute features for one delta.
    ///
    /// With history, price and OI changes come from the session-over-session
    /// delta. Without it, they fall back to the previous close and change in
    /// OI that the exchange reports inside the current record.
    pub fn extract(delta: &DeltaRecord, volume_baseline: Option<f64>) -> Self {
        let record = &delta.current;

        let price_return_pct = if delta.has_history {
            delta.last_price.percentage
        } else {
            match (record.last_price, record.previous_close) {
                (Some(last), Some(prev)) => percent_change(last - prev, prev),
                _ => 0.0,
            }
        };

        let oi_change_pct = if delta.has_history {
            delta.open_interest.percentage
        } else {
            match (record.open_interest, record.change_in_oi) {
                (Some(oi), Some(chg)) => percent_change(chg, oi - chg),
                _ => 0.0,
            }
        };

        let price = record.close_price.or(record.last_price);
        let momentum = match (price, record.previous_close) {
            (Some(p), Some(prev)) if p > prev => Momentum::Up,
            (Some(p), Some(prev)) if p < prev => Momentum::Down,
            _ => Momentum::Flat,
        };

        let volume_spike = match (record.volume, volume_baseline) {
            (Some(v), Some(avg)) if avg > 0.0 => Some(v / avg),
            _ => None,
        };

        Self {
            price_return_pct,
            oi_change_pct,
            momentum,
            volume_spike,
        }
    }
}

/// Trailing average volume per contract over stored sessions.
#[derive(Debug, Clone, Default)]
pub struct VolumeBaseline {
    averages: HashMap<ContractKey, f64>,
}

impl VolumeBaseline {
    /// Average the non-null volumes of each contract across `history`.
    pub fn from_history(history: &[Snapshot]) -> Self {
        let mut sums: HashMap<ContractKey, (f64, usize)> = HashMap::new();
        for snapshot in history {
            for record in &snapshot.records {
                if let Some(volume) = record.volume {
                    let entry = sums.entry(record.key()).or_insert((0.0, 0));
                    entry.0 += volume;
                    entry.1 += 1;
                }
            }
        }
        let averages = sums
            .into_iter()
            .map(|(key, (sum, n))| (key, sum / n as f64))
            .collect();
        Self { averages }
    }

    pub fn get(&self, key: &ContractKey) -> Option<f64> {
        self.averages.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.averages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.averages.is_empty()
    }
}
