//! Domain types: canonical records, contract identity, snapshots.

pub mod record;
pub mod snapshot;

pub use record::{CanonicalField, CanonicalRecord, ContractKey, InstrumentClass, InstrumentKeywords};
pub use snapshot::{Provenance, Snapshot};
