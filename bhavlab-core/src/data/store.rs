//! Historical snapshot store, one Parquet partition per session.
//!
//! Layout: `{root}/session={YYYY-MM-DD}/snapshot.parquet` plus a `meta.json`
//! sidecar (record count, BLAKE3 content hash, provenance, write time).
//!
//! - Writes are atomic (write to .tmp, rename into place), so saving the same
//!   session twice overwrites rather than appends
//! - Loads validate the column set and the content hash
//! - Corrupt partitions are quarantined (`snapshot.parquet.quarantined`)
//!   and treated as absent

use crate::domain::{CanonicalField, CanonicalRecord, Provenance, Snapshot};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const SNAPSHOT_FILE: &str = "snapshot.parquet";
const META_FILE: &str = "meta.json";
const PARTITION_PREFIX: &str = "session=";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("refusing to store an empty snapshot for {0}")]
    EmptySnapshot(NaiveDate),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("metadata error: {0}")]
    Meta(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("metadata does not match stored data: {0}")]
    MetaMismatch(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Metadata sidecar for one stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub session_date: NaiveDate,
    pub record_count: usize,
    pub data_hash: String,
    pub provenance: Option<Provenance>,
    pub stored_at: NaiveDateTime,
}

/// One row of `bhavlab store status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub session_date: NaiveDate,
    pub record_count: Option<usize>,
    pub source_url: Option<String>,
    pub stored_at: Option<NaiveDateTime>,
}

/// Date-keyed snapshot store.
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{PARTITION_PREFIX}{}", date.format("%Y-%m-%d")))
    }

    fn snapshot_path(&self, date: NaiveDate) -> PathBuf {
        self.session_dir(date).join(SNAPSHOT_FILE)
    }

    fn meta_path(&self, date: NaiveDate) -> PathBuf {
        self.session_dir(date).join(META_FILE)
    }

    /// Persist a snapshot under its session date, replacing any earlier copy.
    ///
    /// Both files are staged as `.tmp` before either is renamed, so the
    /// window where a new Parquet file sits beside an old sidecar is two
    /// back-to-back renames. `load` treats a sidecar older than its Parquet
    /// file as stale rather than corrupt.
    pub fn save(&self, snapshot: &Snapshot) -> Result<SnapshotMeta, StoreError> {
        if snapshot.is_empty() {
            return Err(StoreError::EmptySnapshot(snapshot.session_date));
        }
        let date = snapshot.session_date;
        let dir = self.session_dir(date);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        let df = records_to_dataframe(&snapshot.records)?;
        let path = self.snapshot_path(date);
        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(&df, &tmp_path)?;

        let meta = SnapshotMeta {
            session_date: date,
            record_count: snapshot.len(),
            data_hash: content_hash(&snapshot.records)?,
            provenance: snapshot.provenance.clone(),
            stored_at: chrono::Local::now().naive_local(),
        };
        let meta_tmp = match self.stage_meta(&meta) {
            Ok(tmp) => tmp,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            let _ = fs::remove_file(&meta_tmp);
            io_err(&path)(e)
        })?;
        let meta_path = self.meta_path(date);
        fs::rename(&meta_tmp, &meta_path).map_err(io_err(&meta_path))?;

        debug!(session = %date, records = meta.record_count, "snapshot stored");
        Ok(meta)
    }

    /// Write `meta` to the sidecar's `.tmp` path and return that path.
    fn stage_meta(&self, meta: &SnapshotMeta) -> Result<PathBuf, StoreError> {
        let meta_json = serde_json::to_string_pretty(meta)
            .map_err(|e| StoreError::Meta(format!("serialize: {e}")))?;
        let meta_tmp = self.meta_path(meta.session_date).with_extension("json.tmp");
        fs::write(&meta_tmp, meta_json).map_err(io_err(&meta_tmp))?;
        Ok(meta_tmp)
    }

    /// Replace a stale sidecar with one describing the records on disk.
    fn refresh_meta(&self, date: NaiveDate, records: &[CanonicalRecord]) -> Result<(), StoreError> {
        let meta = SnapshotMeta {
            session_date: date,
            record_count: records.len(),
            data_hash: content_hash(records)?,
            provenance: None,
            stored_at: chrono::Local::now().naive_local(),
        };
        let meta_tmp = self.stage_meta(&meta)?;
        let meta_path = self.meta_path(date);
        fs::rename(&meta_tmp, &meta_path).map_err(io_err(&meta_path))
    }

    /// Metadata sidecar for a session, if present and readable.
    pub fn meta(&self, date: NaiveDate) -> Option<SnapshotMeta> {
        let content = fs::read_to_string(self.meta_path(date)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Load the snapshot stored for exactly `date`.
    ///
    /// A missing partition is `Ok(None)`. A partition that fails validation
    /// is quarantined, logged, and also reported as `Ok(None)`.
    pub fn load(&self, date: NaiveDate) -> Result<Option<Snapshot>, StoreError> {
        let path = self.snapshot_path(date);
        if !path.exists() {
            return Ok(None);
        }
        let meta = self.meta(date);
        match load_and_validate(&path, meta.as_ref()) {
            Ok(records) => {
                let mut snapshot = Snapshot::new(date, records);
                snapshot.provenance = meta.and_then(|m| m.provenance);
                Ok(Some(snapshot))
            }
            Err(e @ StoreError::Io { .. }) => Err(e),
            Err(StoreError::MetaMismatch(reason)) if meta_predates(&path, meta.as_ref()) => {
                warn!(session = %date, %reason, "metadata older than snapshot, refreshing it");
                let records = load_and_validate(&path, None)?;
                self.refresh_meta(date, &records)?;
                Ok(Some(Snapshot::new(date, records)))
            }
            Err(e) => {
                let quarantine = path.with_extension("parquet.quarantined");
                warn!(path = %path.display(), error = %e, "quarantining corrupt snapshot");
                let _ = fs::rename(&path, &quarantine);
                Ok(None)
            }
        }
    }

    /// Most recent stored snapshot strictly before `date`, looking back at
    /// most `max_days` calendar days.
    pub fn load_most_recent_before(
        &self,
        date: NaiveDate,
        max_days: u32,
    ) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.load_trailing(date, 1, max_days)?.into_iter().next())
    }

    /// Up to `count` stored snapshots strictly before `date`, newest first,
    /// looking back at most `max_days` calendar days.
    pub fn load_trailing(
        &self,
        date: NaiveDate,
        count: usize,
        max_days: u32,
    ) -> Result<Vec<Snapshot>, StoreError> {
        let mut found = Vec::new();
        for offset in 1..=i64::from(max_days) {
            if found.len() >= count {
                break;
            }
            let day = date - Duration::days(offset);
            if let Some(snapshot) = self.load(day)? {
                found.push(snapshot);
            }
        }
        Ok(found)
    }

    /// Every session date with a stored Parquet file, ascending.
    pub fn sessions(&self) -> Result<Vec<NaiveDate>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root).map_err(io_err(&self.root))?;
        let mut dates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_err(&self.root))?;
            let name = entry.file_name();
            let Some(date) = name
                .to_str()
                .and_then(|n| n.strip_prefix(PARTITION_PREFIX))
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            else {
                continue;
            };
            if entry.path().join(SNAPSHOT_FILE).exists() {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    pub fn status(&self) -> Result<Vec<StoredSession>, StoreError> {
        Ok(self
            .sessions()?
            .into_iter()
            .map(|date| {
                let meta = self.meta(date);
                StoredSession {
                    session_date: date,
                    record_count: meta.as_ref().map(|m| m.record_count),
                    source_url: meta
                        .as_ref()
                        .and_then(|m| m.provenance.as_ref())
                        .map(|p| p.url.clone()),
                    stored_at: meta.as_ref().map(|m| m.stored_at),
                }
            })
            .collect())
    }
}

fn content_hash(records: &[CanonicalRecord]) -> Result<String, StoreError> {
    let bytes = serde_json::to_vec(records)
        .map_err(|e| StoreError::Meta(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn records_to_dataframe(records: &[CanonicalRecord]) -> Result<DataFrame, StoreError> {
    let columns = CanonicalField::ALL
        .iter()
        .map(|&field| {
            if field.is_numeric() {
                let values: Vec<Option<f64>> = records.iter().map(|r| r.number(field)).collect();
                Column::new(field.name().into(), values)
            } else {
                let values: Vec<Option<String>> = records
                    .iter()
                    .map(|r| r.text(field).map(str::to_string))
                    .collect();
                Column::new(field.name().into(), values)
            }
        })
        .collect::<Vec<_>>();
    DataFrame::new(columns).map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), StoreError> {
    let file = fs::File::create(path).map_err(io_err(path))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| StoreError::Parquet(format!("write: {e}")))?;
    Ok(())
}

fn load_and_validate(
    path: &Path,
    meta: Option<&SnapshotMeta>,
) -> Result<Vec<CanonicalRecord>, StoreError> {
    let file = fs::File::open(path).map_err(io_err(path))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(StoreError::Validation("empty parquet file".into()));
    }
    let records = dataframe_to_records(&df)?;

    if let Some(meta) = meta {
        if meta.record_count != records.len() {
            return Err(StoreError::MetaMismatch(format!(
                "meta lists {} records, file holds {}",
                meta.record_count,
                records.len()
            )));
        }
        if meta.data_hash != content_hash(&records)? {
            return Err(StoreError::MetaMismatch("content hash mismatch".into()));
        }
    }
    Ok(records)
}

/// True when the sidecar was written before the Parquet file last changed,
/// which is what an interrupted overwrite leaves behind.
fn meta_predates(path: &Path, meta: Option<&SnapshotMeta>) -> bool {
    let Some(meta) = meta else {
        return false;
    };
    match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => chrono::DateTime::<chrono::Local>::from(modified).naive_local() > meta.stored_at,
        Err(_) => false,
    }
}

fn dataframe_to_records(df: &DataFrame) -> Result<Vec<CanonicalRecord>, StoreError> {
    let mut records = vec![CanonicalRecord::default(); df.height()];
    for field in CanonicalField::ALL {
        let column = df
            .column(field.name())
            .map_err(|_| StoreError::Validation(format!("missing column '{field}'")))?;
        if field.is_numeric() {
            let values = column
                .f64()
                .map_err(|e| StoreError::Validation(format!("{field} column type: {e}")))?;
            for (record, value) in records.iter_mut().zip(values.into_iter()) {
                record.set_number(field, value);
            }
        } else {
            let values = column
                .str()
                .map_err(|e| StoreError::Validation(format!("{field} column type: {e}")))?;
            for (record, value) in records.iter_mut().zip(values.into_iter()) {
                record.set_text(field, value.map(str::to_string));
            }
        }
    }
    Ok(records)
}
