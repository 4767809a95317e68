//! End-to-end pipeline scenarios against an in-memory transport.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use bhavlab_core::data::transport::accept_payload;
use bhavlab_core::data::{
    CandidateLocation, FetchOutcome, FilenamePattern, SoftFailure, TradingCalendar, Transport,
    TransportError,
};
use bhavlab_runner::{Action, BhavlabConfig, Pipeline, PreviousData, RunError, Setup};
use chrono::NaiveDate;

const BASE: &str = "https://archives.test/fo";

enum Reply {
    Body(Vec<u8>),
    Soft(SoftFailure),
    Fatal,
}

/// Serves canned replies by URL; anything unknown is a 404.
struct StubTransport {
    replies: HashMap<String, Reply>,
    min_bytes: usize,
    requested: Rc<RefCell<Vec<String>>>,
}

impl StubTransport {
    fn new(requested: Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            replies: HashMap::new(),
            min_bytes: 0,
            requested,
        }
    }

    fn with(mut self, url: String, reply: Reply) -> Self {
        self.replies.insert(url, reply);
        self
    }
}

impl Transport for StubTransport {
    fn fetch(&self, location: &CandidateLocation) -> Result<FetchOutcome, TransportError> {
        self.requested.borrow_mut().push(location.url.clone());
        match self.replies.get(&location.url) {
            Some(Reply::Body(bytes)) => Ok(accept_payload(location, bytes.clone(), self.min_bytes)),
            Some(Reply::Soft(soft)) => Ok(FetchOutcome::SoftFailure(soft.clone())),
            Some(Reply::Fatal) => Err(TransportError::InvalidRequest {
                url: location.url.clone(),
                reason: "stubbed fatal error".into(),
            }),
            None => Ok(FetchOutcome::SoftFailure(SoftFailure::Status(404))),
        }
    }
}

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 11, day).unwrap()
}

fn raw_url(day: u32) -> String {
    format!("{BASE}/fo{day:02}NOV2024bhav.csv")
}

fn zip_url(day: u32) -> String {
    format!("{BASE}/fo{day:02}NOV2024bhav.csv.zip")
}

fn config(store: &std::path::Path, lookback: u32, patterns: Vec<FilenamePattern>) -> BhavlabConfig {
    let mut config = BhavlabConfig::default();
    config.source.base_url = BASE.into();
    config.source.patterns = patterns;
    config.source.lookback_days = lookback;
    config.holidays.url = None;
    config.store.root = store.to_path_buf();
    config
}

fn both_patterns() -> Vec<FilenamePattern> {
    vec![
        FilenamePattern::raw("fo{dd}{MMM}{yyyy}bhav.csv"),
        FilenamePattern::archive("fo{dd}{MMM}{yyyy}bhav.csv.zip"),
    ]
}

fn bhav_csv(ltp: f64, oi: f64) -> Vec<u8> {
    format!(
        "INSTRUMENT,SYMBOL,EXPIRY_DT,STRIKE_PR,OPTION_TYP,CLOSE,LTP,PREV_CLOSE,OPEN_INT,CHG_IN_OI,CONTRACTS\n\
         FUTSTK,XYZ,28-Nov-2024,0,XX,{ltp},{ltp},100,{oi},0,1000\n\
         OPTSTK,XYZ,28-Nov-2024,120,CE,3.5,3.5,3.0,7000,0,250\n"
    )
    .into_bytes()
}

fn zipped(name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file(name, zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(bytes).unwrap();
    writer.finish().unwrap().into_inner()
}

#[test]
fn every_candidate_failing_exhausts_the_window() {
    let store = tempfile::tempdir().unwrap();
    let requested = Rc::new(RefCell::new(Vec::new()));
    let transport = StubTransport::new(requested.clone())
        .with(raw_url(14), Reply::Soft(SoftFailure::Timeout));
    let pipeline = Pipeline::new(
        config(store.path(), 9, vec![FilenamePattern::raw("fo{dd}{MMM}{yyyy}bhav.csv")]),
        TradingCalendar::weekdays_only(),
        Box::new(transport),
    );

    // Friday 15th back nine calendar days: 15 14 13 12 11 8 7
    let attempts = match pipeline.run(d(15)) {
        Err(RunError::ExhaustedWindow { attempts }) => attempts,
        other => panic!("expected ExhaustedWindow, got {other:?}"),
    };
    assert_eq!(attempts.len(), 7);
    let urls: Vec<_> = attempts.iter().map(|a| a.url.clone()).collect();
    assert_eq!(
        urls,
        [15, 14, 13, 12, 11, 8, 7].map(raw_url).to_vec()
    );
    assert_eq!(attempts[1].reason, "timed out");
    assert_eq!(attempts[0].reason, "HTTP 404");
    assert_eq!(*requested.borrow(), urls);
}

#[test]
fn archive_is_tried_after_raw_for_the_same_date() {
    let store = tempfile::tempdir().unwrap();
    let requested = Rc::new(RefCell::new(Vec::new()));
    let transport = StubTransport::new(requested.clone()).with(
        zip_url(15),
        Reply::Body(zipped("fo15NOV2024bhav.csv", &bhav_csv(101.0, 500.0))),
    );
    let pipeline = Pipeline::new(
        config(store.path(), 5, both_patterns()),
        TradingCalendar::weekdays_only(),
        Box::new(transport),
    );

    let output = pipeline.run(d(15)).unwrap();
    assert_eq!(*requested.borrow(), vec![raw_url(15), zip_url(15)]);
    assert_eq!(output.snapshot.session_date, d(15));
    assert_eq!(output.snapshot.len(), 2);
    assert_eq!(output.previous, PreviousData::Unavailable);

    let provenance = output.snapshot.provenance.as_ref().unwrap();
    assert_eq!(provenance.url, zip_url(15));
    assert_eq!(provenance.delimiter, Some(','));
}

#[test]
fn small_payloads_and_empty_tables_advance_to_older_dates() {
    let store = tempfile::tempdir().unwrap();
    let requested = Rc::new(RefCell::new(Vec::new()));
    let mut transport = StubTransport::new(requested.clone())
        .with(raw_url(15), Reply::Body(b"<html>maintenance</html>".to_vec()))
        .with(zip_url(15), Reply::Body(zipped("fo.csv", b"UNRELATED,COLUMNS\n,\n")))
        .with(raw_url(14), Reply::Body(bhav_csv(99.0, 480.0)));
    transport.min_bytes = 50;
    let pipeline = Pipeline::new(
        config(store.path(), 5, both_patterns()),
        TradingCalendar::weekdays_only(),
        Box::new(transport),
    );

    let output = pipeline.run(d(15)).unwrap();
    assert_eq!(output.snapshot.session_date, d(14));
    assert_eq!(requested.borrow().len(), 3);
    assert_eq!(pipeline.store().sessions().unwrap(), vec![d(14)]);
}

#[test]
fn holidays_are_skipped() {
    let store = tempfile::tempdir().unwrap();
    let requested = Rc::new(RefCell::new(Vec::new()));
    let transport = StubTransport::new(requested.clone())
        .with(raw_url(13), Reply::Body(bhav_csv(99.0, 480.0)));
    let pipeline = Pipeline::new(
        config(store.path(), 5, vec![FilenamePattern::raw("fo{dd}{MMM}{yyyy}bhav.csv")]),
        TradingCalendar::with_holidays([d(15), d(14)]),
        Box::new(transport),
    );

    let output = pipeline.run(d(15)).unwrap();
    assert_eq!(output.snapshot.session_date, d(13));
    assert_eq!(*requested.borrow(), vec![raw_url(13)]);
}

#[test]
fn fatal_transport_error_aborts_the_run() {
    let store = tempfile::tempdir().unwrap();
    let requested = Rc::new(RefCell::new(Vec::new()));
    let transport = StubTransport::new(requested.clone())
        .with(raw_url(14), Reply::Fatal)
        .with(raw_url(13), Reply::Body(bhav_csv(99.0, 480.0)));
    let pipeline = Pipeline::new(
        config(store.path(), 5, vec![FilenamePattern::raw("fo{dd}{MMM}{yyyy}bhav.csv")]),
        TradingCalendar::weekdays_only(),
        Box::new(transport),
    );

    assert!(matches!(pipeline.run(d(15)), Err(RunError::Transport(_))));
    assert_eq!(requested.borrow().len(), 2);
}

#[test]
fn consecutive_sessions_produce_history_deltas() {
    let store = tempfile::tempdir().unwrap();
    let requested = Rc::new(RefCell::new(Vec::new()));
    let transport = StubTransport::new(requested.clone())
        .with(raw_url(14), Reply::Body(bhav_csv(100.0, 500.0)))
        .with(raw_url(15), Reply::Body(bhav_csv(110.0, 550.0)));
    let pipeline = Pipeline::new(
        config(store.path(), 1, vec![FilenamePattern::raw("fo{dd}{MMM}{yyyy}bhav.csv")]),
        TradingCalendar::weekdays_only(),
        Box::new(transport),
    );

    let first = pipeline.run(d(14)).unwrap();
    assert_eq!(first.previous, PreviousData::Unavailable);

    let second = pipeline.run(d(15)).unwrap();
    assert_eq!(second.previous, PreviousData::Available(d(14)));

    let future = second
        .signals
        .iter()
        .find(|s| s.key.instrument_type.as_deref() == Some("FUTSTK"))
        .unwrap();
    assert!(future.has_history);
    assert!((future.features.price_return_pct - 10.0).abs() < 1e-9);
    assert!((future.features.oi_change_pct - 10.0).abs() < 1e-9);
    assert_eq!(future.action, Action::Buy);
    assert_eq!(future.setup, Setup::LongBuildup);
    assert_eq!(future.key.expiry.as_deref(), Some("2024-11-28"));

    // re-running a stored session overwrites, it does not append
    let rerun = pipeline.run(d(15)).unwrap();
    assert_eq!(rerun.previous, PreviousData::Available(d(14)));
    assert_eq!(pipeline.store().sessions().unwrap(), vec![d(14), d(15)]);
    assert_eq!(pipeline.store().load(d(15)).unwrap().unwrap().len(), 2);
}
