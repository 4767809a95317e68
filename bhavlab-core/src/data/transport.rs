//! Transport fetcher.
//!
//! One bounded-timeout GET per candidate location, never retried. Anything the
//! remote archive can do wrong (network error, timeout, non-2xx status, a
//! payload too small to be a real file) is a [`SoftFailure`] returned as a
//! value so the driving loop advances to the next candidate. Only a request
//! that cannot be constructed at all is a [`TransportError`].

use super::locations::CandidateLocation;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Immutable downloaded bytes plus where they came from.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub location: CandidateLocation,
    pub bytes: Vec<u8>,
}

impl RawPayload {
    pub fn new(location: CandidateLocation, bytes: Vec<u8>) -> Self {
        Self { location, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Expected failure that only advances the candidate cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftFailure {
    Network(String),
    Timeout,
    Status(u16),
    TooSmall { bytes: usize, min: usize },
}

impl fmt::Display for SoftFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoftFailure::Network(msg) => write!(f, "network error: {msg}"),
            SoftFailure::Timeout => f.write_str("timed out"),
            SoftFailure::Status(code) => write!(f, "HTTP {code}"),
            SoftFailure::TooSmall { bytes, min } => {
                write!(f, "payload too small ({bytes} bytes, need at least {min})")
            }
        }
    }
}

/// Result of one attempt.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Payload(RawPayload),
    SoftFailure(SoftFailure),
}

/// Fatal request-construction errors. These indicate a configuration or
/// programming mistake, not an unlucky remote.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request for '{url}': {reason}")]
    InvalidRequest { url: String, reason: String },

    #[error("HTTP client could not be built: {0}")]
    Client(String),
}

/// Fetches a single candidate location.
pub trait Transport {
    fn fetch(&self, location: &CandidateLocation) -> Result<FetchOutcome, TransportError>;
}

/// Check a downloaded body against the minimum plausible size.
pub fn accept_payload(location: &CandidateLocation, bytes: Vec<u8>, min_bytes: usize) -> FetchOutcome {
    if bytes.len() < min_bytes {
        return FetchOutcome::SoftFailure(SoftFailure::TooSmall {
            bytes: bytes.len(),
            min: min_bytes,
        });
    }
    FetchOutcome::Payload(RawPayload::new(location.clone(), bytes))
}

/// Settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub min_payload_bytes: usize,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            min_payload_bytes: 300,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into(),
        }
    }
}

/// Blocking HTTP transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    min_payload_bytes: usize,
}

impl HttpTransport {
    pub fn new(settings: &HttpSettings) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self {
            client,
            min_payload_bytes: settings.min_payload_bytes,
        })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, location: &CandidateLocation) -> Result<FetchOutcome, TransportError> {
        let url = reqwest::Url::parse(&location.url).map_err(|e| TransportError::InvalidRequest {
            url: location.url.clone(),
            reason: e.to_string(),
        })?;

        let request = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "*/*")
            .build()
            .map_err(|e| TransportError::InvalidRequest {
                url: location.url.clone(),
                reason: e.to_string(),
            })?;

        let resp = match self.client.execute(request) {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return Ok(FetchOutcome::SoftFailure(SoftFailure::Timeout)),
            Err(e) => return Ok(FetchOutcome::SoftFailure(SoftFailure::Network(e.to_string()))),
        };

        let status = resp.status();
        if !status.is_success() {
            debug!(url = %location.url, %status, "non-success status");
            return Ok(FetchOutcome::SoftFailure(SoftFailure::Status(status.as_u16())));
        }

        match resp.bytes() {
            Ok(body) => Ok(accept_payload(location, body.to_vec(), self.min_payload_bytes)),
            Err(e) if e.is_timeout() => Ok(FetchOutcome::SoftFailure(SoftFailure::Timeout)),
            Err(e) => Ok(FetchOutcome::SoftFailure(SoftFailure::Network(e.to_string()))),
        }
    }
}
