//! Acquisition driver: calendar gate → candidates → fetch → unpack → sniff →
//! parse → normalize, then history lookup, deltas and signals.
//!
//! Each candidate is tried at most once and independently of the others. A
//! failure inside one candidate is recorded and the loop advances; only an
//! exhausted window (or a fatal transport error) ends the run.

use std::fmt;

use bhavlab_core::data::{
    normalize, parse, sniff, unpack, CandidateLocation, FetchOutcome, HttpTransport,
    LocationGenerator, RemoteHolidays, SnapshotStore, SoftFailure, StoreError, TableError,
    TradingCalendar, Transport, TransportError, UnpackError,
};
use bhavlab_core::domain::{Provenance, Snapshot};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{BhavlabConfig, HolidayConfig};
use crate::delta::diff;
use crate::features::VolumeBaseline;
use crate::signal::{Signal, SignalClassifier};

/// One failed candidate, kept for the exhausted-window report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub url: String,
    pub date: NaiveDate,
    pub reason: String,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.url, self.date, self.reason)
    }
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no usable bhavcopy in the lookback window ({} locations tried)", .attempts.len())]
    ExhaustedWindow { attempts: Vec<Attempt> },
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Why a single candidate produced no snapshot.
#[derive(Debug)]
enum CandidateFailure {
    Fetch(SoftFailure),
    Unpack(UnpackError),
    Parse(TableError),
    NoRecords,
    Fatal(TransportError),
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateFailure::Fetch(soft) => write!(f, "{soft}"),
            CandidateFailure::Unpack(e) => write!(f, "unpack: {e}"),
            CandidateFailure::Parse(e) => write!(f, "parse: {e}"),
            CandidateFailure::NoRecords => f.write_str("no canonical records"),
            CandidateFailure::Fatal(e) => write!(f, "{e}"),
        }
    }
}

/// Whether a previous session was available for deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreviousData {
    Available(NaiveDate),
    Unavailable,
}

/// Everything a downstream consumer receives from a run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub signals: Vec<Signal>,
    pub snapshot: Snapshot,
    pub previous: PreviousData,
}

/// Build the session calendar from configuration.
///
/// Offline runs, or a config without a holiday URL, use weekday-only logic.
/// Configured fixed dates are always excluded.
pub fn build_calendar(config: &HolidayConfig, offline: bool) -> TradingCalendar {
    let calendar = match (&config.url, offline) {
        (Some(url), false) => {
            match RemoteHolidays::new(url.as_str(), config.timeout()) {
                Ok(remote) => TradingCalendar::load(&remote),
                Err(e) => {
                    warn!(error = %e, "holiday client unavailable, using weekday-only calendar");
                    TradingCalendar::weekdays_only()
                }
            }
        }
        _ => TradingCalendar::weekdays_only(),
    };
    calendar.with_extra_holidays(config.dates.iter().copied())
}

pub struct Pipeline {
    config: BhavlabConfig,
    calendar: TradingCalendar,
    transport: Box<dyn Transport>,
    store: SnapshotStore,
}

impl Pipeline {
    pub fn new(config: BhavlabConfig, calendar: TradingCalendar, transport: Box<dyn Transport>) -> Self {
        let store = SnapshotStore::new(config.store.root.clone());
        Self {
            config,
            calendar,
            transport,
            store,
        }
    }

    /// HTTP transport and the configured holiday source.
    pub fn from_config(config: BhavlabConfig, offline_calendar: bool) -> Result<Self, RunError> {
        let transport = HttpTransport::new(&config.source.http_settings())?;
        let calendar = build_calendar(&config.holidays, offline_calendar);
        Ok(Self::new(config, calendar, Box::new(transport)))
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Probe candidates newest-first until one yields a non-empty snapshot.
    pub fn acquire(&self, today: NaiveDate) -> Result<Snapshot, RunError> {
        let generator = LocationGenerator::new(&self.config.source.base_url, &self.config.source.patterns);
        let mut attempts = Vec::new();

        for candidate in generator.candidates(&self.calendar, today, self.config.source.lookback_days) {
            match self.try_candidate(&candidate) {
                Ok(snapshot) => {
                    info!(
                        url = %candidate.url,
                        session = %candidate.date,
                        records = snapshot.len(),
                        "acquired snapshot"
                    );
                    return Ok(snapshot);
                }
                Err(CandidateFailure::Fatal(e)) => return Err(RunError::Transport(e)),
                Err(failure) => {
                    debug!(url = %candidate.url, reason = %failure, "candidate failed");
                    attempts.push(Attempt {
                        url: candidate.url.clone(),
                        date: candidate.date,
                        reason: failure.to_string(),
                    });
                }
            }
        }

        warn!(attempts = attempts.len(), "lookback window exhausted");
        Err(RunError::ExhaustedWindow { attempts })
    }

    fn try_candidate(&self, candidate: &CandidateLocation) -> Result<Snapshot, CandidateFailure> {
        // Step 1: fetch
        let payload = match self.transport.fetch(candidate) {
            Ok(FetchOutcome::Payload(payload)) => payload,
            Ok(FetchOutcome::SoftFailure(soft)) => return Err(CandidateFailure::Fetch(soft)),
            Err(e) => return Err(CandidateFailure::Fatal(e)),
        };

        // Step 2: unpack (content signature, not the URL, decides)
        let payload = unpack(payload, &self.config.unpack).map_err(CandidateFailure::Unpack)?;

        // Step 3: sniff + parse
        let sniffed = sniff(&payload.bytes, &self.config.sniff);
        let table = parse(&sniffed.text, sniffed.delimiter, self.config.sniff.sample_lines)
            .map_err(CandidateFailure::Parse)?;

        // Step 4: normalize
        let snapshot = normalize(&table, candidate.date, &self.config.schema);
        if snapshot.is_empty() {
            return Err(CandidateFailure::NoRecords);
        }
        Ok(snapshot.with_provenance(Provenance {
            url: candidate.url.clone(),
            encoding: sniffed.encoding,
            delimiter: sniffed.delimiter,
            strategy: table.strategy.to_string(),
        }))
    }

    /// Full run: acquire, read history, store today's snapshot, classify.
    pub fn run(&self, today: NaiveDate) -> Result<RunOutput, RunError> {
        let snapshot = self.acquire(today)?;
        let session = snapshot.session_date;
        let store_cfg = &self.config.store;

        let previous = self
            .store
            .load_most_recent_before(session, store_cfg.lookback_days)?;
        let history = self.store.load_trailing(
            session,
            self.config.signal.volume_window,
            store_cfg.history_days,
        )?;
        let baseline = VolumeBaseline::from_history(&history);

        self.store.save(&snapshot)?;

        let previous_data = match &previous {
            Some(prev) => PreviousData::Available(prev.session_date),
            None => {
                info!(session = %session, "no previous snapshot, deltas fall back to reported changes");
                PreviousData::Unavailable
            }
        };

        let classifier = SignalClassifier::new(
            self.config.signal.clone(),
            self.config.schema.instrument_keywords.clone(),
        );
        let signals = diff(&snapshot, previous.as_ref())
            .iter()
            .map(|delta| classifier.classify(delta, baseline.get(&delta.key)))
            .collect();

        Ok(RunOutput {
            signals,
            snapshot,
            previous: previous_data,
        })
    }
}
