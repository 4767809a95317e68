use super::record::{CanonicalRecord, ContractKey};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// All canonical records for one trading session.
///
/// Produced once by a pipeline run and treated as read-only afterwards.
/// Contract identities are unique within a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub session_date: NaiveDate,
    pub records: Vec<CanonicalRecord>,
    /// Where the payload came from, when known.
    pub provenance: Option<Provenance>,
}

/// How a snapshot was acquired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub url: String,
    pub encoding: String,
    pub delimiter: Option<char>,
    pub strategy: String,
}

impl Snapshot {
    pub fn new(session_date: NaiveDate, records: Vec<CanonicalRecord>) -> Self {
        Self {
            session_date,
            records,
            provenance: None,
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Lookup table by contract identity.
    pub fn index(&self) -> HashMap<ContractKey, &CanonicalRecord> {
        self.records.iter().map(|r| (r.key(), r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_keyed_by_contract() {
        let rec = CanonicalRecord {
            symbol: Some("XYZ".into()),
            last_price: Some(100.0),
            ..Default::default()
        };
        let snap = Snapshot::new(NaiveDate::from_ymd_opt(2024, 11, 15).unwrap(), vec![rec.clone()]);
        let idx = snap.index();
        assert_eq!(idx.len(), 1);
        assert_eq!(idx[&rec.key()].last_price, Some(100.0));
    }
}
