//! Schema normalizer.
//!
//! Every canonical field is looked up in the table header through a list of
//! known source aliases. The alias table is versioned configuration; this
//! module never branches on a particular exchange format. Fields with no
//! matching column become nulls for every row.

use crate::domain::{CanonicalField, CanonicalRecord, InstrumentKeywords, Snapshot};
use super::table::RawTable;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Date layouts seen in expiry columns, tried in order.
const EXPIRY_FORMATS: [&str; 5] = ["%d-%b-%Y", "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d%b%Y"];

/// Column alias table plus instrument-class keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaSettings {
    /// Free-form tag for the alias table revision.
    pub version: String,
    /// Source column names per canonical field, in preference order.
    /// Fields named in a config file replace that field's list only; every
    /// other field keeps its built-in aliases. An empty list disables a field.
    #[serde(deserialize_with = "merge_over_default_aliases")]
    pub aliases: BTreeMap<CanonicalField, Vec<String>>,
    pub instrument_keywords: InstrumentKeywords,
}

impl SchemaSettings {
    pub fn aliases_for(&self, field: CanonicalField) -> &[String] {
        self.aliases.get(&field).map_or(&[], Vec::as_slice)
    }
}

fn merge_over_default_aliases<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<CanonicalField, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<CanonicalField, Vec<String>>::deserialize(deserializer)?;
    let mut aliases = default_aliases();
    aliases.extend(overrides);
    Ok(aliases)
}

fn default_aliases() -> BTreeMap<CanonicalField, Vec<String>> {
    use CanonicalField::*;
    let table: [(CanonicalField, &[&str]); 13] = [
        (Symbol, &["TckrSymb", "SYMBOL", "SYMBOL_NAME", "Ticker", "Underlying"]),
        (InstrumentType, &["FinInstrmTp", "INSTRUMENT", "SECURITY TYPE", "InstrumentType"]),
        (Expiry, &["XpryDt", "EXPIRY_DT", "EXPIRY_DATE", "EXPIRY", "FininstrmActlXpryDt"]),
        (Strike, &["StrkPric", "STRIKE_PR", "STRIKE_PRICE", "STRIKE"]),
        (OptionType, &["OptnTp", "OPTION_TYP", "OPTION_TYPE", "OptionType"]),
        (OpenInterest, &["OpnIntrst", "OPEN_INT", "OI", "OPEN_INTEREST"]),
        (ChangeInOi, &["ChngInOpnIntrst", "CHG_IN_OI", "CHANGE_IN_OI", "CHG_OI"]),
        (Volume, &["TtlTradgVol", "CONTRACTS", "VOLUME", "TOTTRDQTY", "TRADING_VOLUME"]),
        (TradedValue, &["TtlTrfVal", "VAL_INLAKH", "TURNOVER", "TRADED_VALUE", "VALUE"]),
        (LastPrice, &["LastPric", "LTP", "LAST_TRADED_PRICE", "LAST", "OPT_LTP"]),
        (ClosePrice, &["ClsPric", "CLOSE", "CLOSE_PRICE"]),
        (PreviousClose, &["PrvsClsgPric", "PREV_CLOSE", "PREVCLOSE", "PREVIOUS_CLOSE"]),
        (SettlementPrice, &["SttlmPric", "SETTLE_PR", "SETTLEMENT_PRICE", "SETTLE_PRICE"]),
    ];
    table
        .into_iter()
        .map(|(field, names)| (field, names.iter().map(|s| s.to_string()).collect()))
        .collect()
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            version: "nse-fo-2024".into(),
            aliases: default_aliases(),
            instrument_keywords: InstrumentKeywords::default(),
        }
    }
}

/// Which table column feeds each canonical field (`None` = schema gap).
pub fn resolve_columns(table: &RawTable, schema: &SchemaSettings) -> Vec<(CanonicalField, Option<usize>)> {
    CanonicalField::ALL
        .iter()
        .map(|&field| {
            let column = schema
                .aliases_for(field)
                .iter()
                .find_map(|alias| table.column_index(alias.trim()));
            (field, column)
        })
        .collect()
}

/// Map a raw table onto canonical records for `session_date`.
///
/// Blank rows are dropped and repeated contract identities keep their first
/// occurrence.
pub fn normalize(table: &RawTable, session_date: NaiveDate, schema: &SchemaSettings) -> Snapshot {
    let columns = resolve_columns(table, schema);
    for (field, column) in &columns {
        if column.is_none() {
            debug!(%field, "no source column, filling with nulls");
        }
    }

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(table.len());
    let mut duplicates = 0usize;

    for row in &table.rows {
        let mut record = CanonicalRecord::default();
        for &(field, column) in &columns {
            let cell = column.and_then(|i| row.get(i)).map(String::as_str);
            if field.is_numeric() {
                record.set_number(field, cell.and_then(coerce_number));
            } else {
                record.set_text(field, cell.and_then(|c| coerce_text(field, c)));
            }
        }
        if record.is_blank() {
            continue;
        }
        if !seen.insert(record.key()) {
            duplicates += 1;
            continue;
        }
        records.push(record);
    }

    if duplicates > 0 {
        debug!(duplicates, "dropped repeated contract identities");
    }
    Snapshot::new(session_date, records)
}

/// Numeric coercion: non-numeric text becomes null, never an error.
pub fn coerce_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell.trim().chars().filter(|&c| c != ',').collect();
    if cleaned.is_empty()
        || cleaned == "-"
        || ["NA", "N/A", "NAN", "NULL", "NONE"]
            .iter()
            .any(|m| cleaned.eq_ignore_ascii_case(m))
    {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn coerce_text(field: CanonicalField, cell: &str) -> Option<String> {
    let value = cell.trim();
    if value.is_empty() {
        return None;
    }
    Some(match field {
        CanonicalField::InstrumentType | CanonicalField::OptionType => value.to_ascii_uppercase(),
        CanonicalField::Expiry => normalize_expiry(value),
        _ => value.to_string(),
    })
}

/// Rewrite recognised date layouts as `YYYY-MM-DD`; anything else is kept.
pub fn normalize_expiry(value: &str) -> String {
    EXPIRY_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| value.to_string())
}
