//! Signal classifier: a pure threshold function over [`Features`].
//!
//! All comparisons are strict, so a feature sitting exactly on a threshold
//! resolves to HOLD.

use crate::delta::DeltaRecord;
use crate::features::{Features, Momentum};
use bhavlab_core::domain::{ContractKey, InstrumentClass, InstrumentKeywords};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tunable cut-offs, in percent for returns and OI, as ratios for spikes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalThresholds {
    pub buy_return_pct: f64,
    pub sell_return_pct: f64,
    pub buy_oi_pct: f64,
    pub sell_oi_pct: f64,
    pub high_spike: f64,
    pub medium_spike: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            buy_return_pct: 0.5,
            sell_return_pct: -0.5,
            buy_oi_pct: 2.0,
            sell_oi_pct: -2.0,
            high_spike: 2.0,
            medium_spike: 1.2,
        }
    }
}

/// How actions are spelled in output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelStyle {
    #[default]
    BuySellHold,
    LongShortNeutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    pub thresholds: SignalThresholds,
    pub label_style: LabelStyle,
    /// Stored sessions averaged for the volume-spike baseline.
    pub volume_window: usize,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            thresholds: SignalThresholds::default(),
            label_style: LabelStyle::default(),
            volume_window: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn label(self, style: LabelStyle) -> &'static str {
        match (self, style) {
            (Action::Buy, LabelStyle::BuySellHold) => "BUY",
            (Action::Sell, LabelStyle::BuySellHold) => "SELL",
            (Action::Hold, LabelStyle::BuySellHold) => "HOLD",
            (Action::Buy, LabelStyle::LongShortNeutral) => "LONG",
            (Action::Sell, LabelStyle::LongShortNeutral) => "SHORT",
            (Action::Hold, LabelStyle::LongShortNeutral) => "NEUTRAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::High => "High",
            Confidence::Medium => "Medium",
            Confidence::Low => "Low",
        };
        f.write_str(s)
    }
}

/// Open-interest reading of the price move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Setup {
    LongBuildup,
    ShortBuildup,
    ShortCovering,
    LongUnwinding,
    Neutral,
}

impl Setup {
    pub fn from_features(features: &Features) -> Self {
        let price = features.price_return_pct;
        let oi = features.oi_change_pct;
        if price > 0.0 && oi > 0.0 {
            Setup::LongBuildup
        } else if price < 0.0 && oi > 0.0 {
            Setup::ShortBuildup
        } else if price > 0.0 && oi < 0.0 {
            Setup::ShortCovering
        } else if price < 0.0 && oi < 0.0 {
            Setup::LongUnwinding
        } else {
            Setup::Neutral
        }
    }
}

impl fmt::Display for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Setup::LongBuildup => "Long Buildup",
            Setup::ShortBuildup => "Short Buildup",
            Setup::ShortCovering => "Short Covering",
            Setup::LongUnwinding => "Long Unwinding",
            Setup::Neutral => "Neutral",
        };
        f.write_str(s)
    }
}

/// Classifier output for one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub key: ContractKey,
    pub class: InstrumentClass,
    pub action: Action,
    /// Only BUY/SELL carry a confidence.
    pub confidence: Option<Confidence>,
    pub setup: Setup,
    pub features: Features,
    /// `action` spelled in the configured label style.
    pub label: String,
    pub has_history: bool,
    pub last_price: Option<f64>,
    pub open_interest: Option<f64>,
}

pub struct SignalClassifier {
    settings: SignalSettings,
    keywords: InstrumentKeywords,
}

impl SignalClassifier {
    pub fn new(settings: SignalSettings, keywords: InstrumentKeywords) -> Self {
        Self { settings, keywords }
    }

    pub fn action(&self, features: &Features) -> Action {
        let t = &self.settings.thresholds;
        if features.price_return_pct > t.buy_return_pct
            && features.oi_change_pct > t.buy_oi_pct
            && features.momentum == Momentum::Up
        {
            Action::Buy
        } else if features.price_return_pct < t.sell_return_pct
            && features.oi_change_pct < t.sell_oi_pct
            && features.momentum == Momentum::Down
        {
            Action::Sell
        } else {
            Action::Hold
        }
    }

    pub fn confidence(&self, features: &Features) -> Confidence {
        let t = &self.settings.thresholds;
        match features.volume_spike {
            Some(spike) if spike > t.high_spike => Confidence::High,
            Some(spike) if spike > t.medium_spike => Confidence::Medium,
            _ => Confidence::Low,
        }
    }

    /// Classify one delta; the delta is only read.
    pub fn classify(&self, delta: &DeltaRecord, volume_baseline: Option<f64>) -> Signal {
        let features = Features::extract(delta, volume_baseline);
        let action = self.action(&features);
        let confidence = match action {
            Action::Hold => None,
            Action::Buy | Action::Sell => Some(self.confidence(&features)),
        };
        Signal {
            key: delta.key.clone(),
            class: delta.current.class(&self.keywords),
            action,
            confidence,
            setup: Setup::from_features(&features),
            features,
            label: action.label(self.settings.label_style).to_string(),
            has_history: delta.has_history,
            last_price: delta.current.last_price,
            open_interest: delta.current.open_interest,
        }
    }
}
