//! Container unpacker.
//!
//! Archives are recognized by their content signature, never by the URL's
//! extension. From an archive we take the first member with a tabular
//! extension, or the first file member when nothing matches.

use super::transport::RawPayload;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_ARCHIVE: &[u8] = b"PK\x05\x06";

#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("corrupt archive: {0}")]
    Corrupt(String),

    #[error("archive has no file members")]
    EmptyArchive,
}

impl From<zip::result::ZipError> for UnpackError {
    fn from(e: zip::result::ZipError) -> Self {
        UnpackError::Corrupt(e.to_string())
    }
}

impl From<std::io::Error> for UnpackError {
    fn from(e: std::io::Error) -> Self {
        UnpackError::Corrupt(e.to_string())
    }
}

/// Which member names count as tabular files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnpackSettings {
    /// Case-insensitive filename suffixes, in no particular order.
    pub tabular_extensions: Vec<String>,
}

impl Default for UnpackSettings {
    fn default() -> Self {
        Self {
            tabular_extensions: [".csv", ".txt", ".dat", ".tsv"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

pub fn is_archive(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_LOCAL_HEADER) || bytes.starts_with(ZIP_EMPTY_ARCHIVE)
}

/// Return the tabular bytes inside `payload`, or the payload itself when it
/// is not an archive.
pub fn unpack(payload: RawPayload, settings: &UnpackSettings) -> Result<RawPayload, UnpackError> {
    if !is_archive(&payload.bytes) {
        return Ok(payload);
    }

    let mut archive = ZipArchive::new(Cursor::new(payload.bytes.as_slice()))?;

    let mut first_file = None;
    let mut tabular = None;
    for i in 0..archive.len() {
        let member = archive.by_index(i)?;
        if member.is_dir() {
            continue;
        }
        let name = member.name().to_ascii_lowercase();
        if first_file.is_none() {
            first_file = Some(i);
        }
        if settings
            .tabular_extensions
            .iter()
            .any(|ext| name.ends_with(&ext.to_ascii_lowercase()))
        {
            tabular = Some(i);
            break;
        }
    }

    let index = tabular.or(first_file).ok_or(UnpackError::EmptyArchive)?;
    let mut member = archive.by_index(index)?;
    debug!(member = member.name(), matched = tabular.is_some(), "extracting archive member");

    // The declared size comes from the archive header and is not trusted.
    let mut bytes = Vec::new();
    member.read_to_end(&mut bytes)?;

    Ok(RawPayload::new(payload.location, bytes))
}
