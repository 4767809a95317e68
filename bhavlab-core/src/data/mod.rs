//! Acquisition and storage: calendar gate through historical store.

pub mod calendar;
pub mod locations;
pub mod normalize;
pub mod sniff;
pub mod store;
pub mod table;
pub mod transport;
pub mod unpack;

pub use calendar::{HolidayError, HolidaySource, RemoteHolidays, StaticHolidays, TradingCalendar};
pub use locations::{
    default_patterns, CandidateLocation, FilenamePattern, FormatKind, LocationGenerator,
};
pub use normalize::{normalize, SchemaSettings};
pub use sniff::{sniff, SniffSettings, SniffedText};
pub use store::{SnapshotMeta, SnapshotStore, StoreError, StoredSession};
pub use table::{parse, ParseStrategy, RawTable, TableError};
pub use transport::{
    FetchOutcome, HttpSettings, HttpTransport, RawPayload, SoftFailure, Transport, TransportError,
};
pub use unpack::{unpack, UnpackError, UnpackSettings};
