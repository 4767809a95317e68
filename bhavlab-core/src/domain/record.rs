//! Canonical record: one normalized row of a derivatives snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed output columns produced regardless of source schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Symbol,
    InstrumentType,
    Expiry,
    Strike,
    OptionType,
    OpenInterest,
    ChangeInOi,
    Volume,
    TradedValue,
    LastPrice,
    ClosePrice,
    PreviousClose,
    SettlementPrice,
}

impl CanonicalField {
    /// Every canonical field, in output column order.
    pub const ALL: [CanonicalField; 13] = [
        CanonicalField::Symbol,
        CanonicalField::InstrumentType,
        CanonicalField::Expiry,
        CanonicalField::Strike,
        CanonicalField::OptionType,
        CanonicalField::OpenInterest,
        CanonicalField::ChangeInOi,
        CanonicalField::Volume,
        CanonicalField::TradedValue,
        CanonicalField::LastPrice,
        CanonicalField::ClosePrice,
        CanonicalField::PreviousClose,
        CanonicalField::SettlementPrice,
    ];

    /// Column name used in snapshot files and exports.
    pub fn name(self) -> &'static str {
        match self {
            CanonicalField::Symbol => "symbol",
            CanonicalField::InstrumentType => "instrument_type",
            CanonicalField::Expiry => "expiry",
            CanonicalField::Strike => "strike",
            CanonicalField::OptionType => "option_type",
            CanonicalField::OpenInterest => "open_interest",
            CanonicalField::ChangeInOi => "change_in_oi",
            CanonicalField::Volume => "volume",
            CanonicalField::TradedValue => "traded_value",
            CanonicalField::LastPrice => "last_price",
            CanonicalField::ClosePrice => "close_price",
            CanonicalField::PreviousClose => "previous_close",
            CanonicalField::SettlementPrice => "settlement_price",
        }
    }

    /// Whether values of this field are coerced to numbers.
    pub fn is_numeric(self) -> bool {
        !matches!(
            self,
            CanonicalField::Symbol
                | CanonicalField::InstrumentType
                | CanonicalField::Expiry
                | CanonicalField::OptionType
        )
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One normalized row. `None` means the source had no usable value, which is
/// distinct from a reported zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub symbol: Option<String>,
    pub instrument_type: Option<String>,
    pub expiry: Option<String>,
    pub strike: Option<f64>,
    pub option_type: Option<String>,
    pub open_interest: Option<f64>,
    pub change_in_oi: Option<f64>,
    pub volume: Option<f64>,
    pub traded_value: Option<f64>,
    pub last_price: Option<f64>,
    pub close_price: Option<f64>,
    pub previous_close: Option<f64>,
    pub settlement_price: Option<f64>,
}

impl CanonicalRecord {
    /// Contract identity of this row.
    pub fn key(&self) -> ContractKey {
        ContractKey {
            symbol: self.symbol.clone(),
            instrument_type: self.instrument_type.clone(),
            expiry: self.expiry.clone(),
            strike: self.strike.map(strike_ticks),
            option_type: self.option_type.clone(),
        }
    }

    /// Text value of a non-numeric field (`None` for numeric fields).
    pub fn text(&self, field: CanonicalField) -> Option<&str> {
        match field {
            CanonicalField::Symbol => self.symbol.as_deref(),
            CanonicalField::InstrumentType => self.instrument_type.as_deref(),
            CanonicalField::Expiry => self.expiry.as_deref(),
            CanonicalField::OptionType => self.option_type.as_deref(),
            _ => None,
        }
    }

    /// Numeric value of a numeric field (`None` for text fields).
    pub fn number(&self, field: CanonicalField) -> Option<f64> {
        match field {
            CanonicalField::Strike => self.strike,
            CanonicalField::OpenInterest => self.open_interest,
            CanonicalField::ChangeInOi => self.change_in_oi,
            CanonicalField::Volume => self.volume,
            CanonicalField::TradedValue => self.traded_value,
            CanonicalField::LastPrice => self.last_price,
            CanonicalField::ClosePrice => self.close_price,
            CanonicalField::PreviousClose => self.previous_close,
            CanonicalField::SettlementPrice => self.settlement_price,
            _ => None,
        }
    }

    pub fn set_text(&mut self, field: CanonicalField, value: Option<String>) {
        match field {
            CanonicalField::Symbol => self.symbol = value,
            CanonicalField::InstrumentType => self.instrument_type = value,
            CanonicalField::Expiry => self.expiry = value,
            CanonicalField::OptionType => self.option_type = value,
            _ => {}
        }
    }

    pub fn set_number(&mut self, field: CanonicalField, value: Option<f64>) {
        match field {
            CanonicalField::Strike => self.strike = value,
            CanonicalField::OpenInterest => self.open_interest = value,
            CanonicalField::ChangeInOi => self.change_in_oi = value,
            CanonicalField::Volume => self.volume = value,
            CanonicalField::TradedValue => self.traded_value = value,
            CanonicalField::LastPrice => self.last_price = value,
            CanonicalField::ClosePrice => self.close_price = value,
            CanonicalField::PreviousClose => self.previous_close = value,
            CanonicalField::SettlementPrice => self.settlement_price = value,
            _ => {}
        }
    }

    /// True when every field is null.
    pub fn is_blank(&self) -> bool {
        CanonicalField::ALL.iter().all(|&f| {
            if f.is_numeric() {
                self.number(f).is_none()
            } else {
                self.text(f).is_none()
            }
        })
    }

    /// Futures / options split, from the instrument type with an option-type fallback.
    pub fn class(&self, keywords: &InstrumentKeywords) -> InstrumentClass {
        InstrumentClass::classify(
            self.instrument_type.as_deref(),
            self.option_type.as_deref(),
            keywords,
        )
    }
}

/// Strike prices are compared in ten-thousandths so that `24500` and
/// `24500.00` from different files land on the same key.
fn strike_ticks(strike: f64) -> i64 {
    (strike * 10_000.0).round() as i64
}

/// Full contract identity: symbol, instrument type, expiry, strike, option type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractKey {
    pub symbol: Option<String>,
    pub instrument_type: Option<String>,
    pub expiry: Option<String>,
    /// Strike in ten-thousandths.
    pub strike: Option<i64>,
    pub option_type: Option<String>,
}

impl ContractKey {
    pub fn strike_price(&self) -> Option<f64> {
        self.strike.map(|t| t as f64 / 10_000.0)
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
        write!(
            f,
            "{} {} {}",
            part(&self.symbol),
            part(&self.instrument_type),
            part(&self.expiry)
        )?;
        if let Some(strike) = self.strike_price() {
            write!(f, " {strike}")?;
        }
        if let Some(opt) = &self.option_type {
            write!(f, " {opt}")?;
        }
        Ok(())
    }
}

/// Coarse instrument family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentClass {
    Future,
    Option,
    Other,
}

impl InstrumentClass {
    pub fn classify(
        instrument_type: Option<&str>,
        option_type: Option<&str>,
        keywords: &InstrumentKeywords,
    ) -> Self {
        if let Some(kind) = instrument_type {
            let kind = kind.to_ascii_uppercase();
            if keywords.futures.iter().any(|k| kind.contains(k.as_str())) {
                return InstrumentClass::Future;
            }
            if keywords.options.iter().any(|k| kind.contains(k.as_str())) {
                return InstrumentClass::Option;
            }
        }
        match option_type.map(|o| o.to_ascii_uppercase()) {
            Some(o) if o == "CE" || o == "PE" => InstrumentClass::Option,
            _ => InstrumentClass::Other,
        }
    }
}

/// Upper-case substrings that identify futures and options instrument types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentKeywords {
    pub futures: Vec<String>,
    pub options: Vec<String>,
}

impl Default for InstrumentKeywords {
    fn default() -> Self {
        Self {
            futures: ["FUT", "STF", "IDF"].into_iter().map(String::from).collect(),
            options: ["OPT", "STO", "IDO"].into_iter().map(String::from).collect(),
        }
    }
}
