//! BhavLab Core: domain types and the acquisition stages for the NSE F&O
//! end-of-day file.
//!
//! - Canonical records, contract identity and per-session snapshots
//! - Trading-calendar gate and candidate location generator
//! - Transport, archive unpacking, encoding/delimiter sniffing
//! - Tabular parser fallback ladder and schema normalizer
//! - Date-keyed Parquet snapshot store

pub mod data;
pub mod domain;
