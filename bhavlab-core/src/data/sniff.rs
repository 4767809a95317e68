//! Format sniffer: text encoding and field delimiter, both inferred from the
//! bytes alone.
//!
//! Encoding: the statistical detector's guess first, then the configured
//! ladder, accepting the first encoding that decodes without errors. If every
//! rung fails the bytes are force-decoded with replacement, so sniffing never
//! fails.
//!
//! Delimiter: occurrences of each candidate are counted over the first lines
//! of text. The highest count wins; ties go to the earlier candidate. All-zero
//! counts leave the delimiter undetermined.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Tunables for encoding and delimiter inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SniffSettings {
    /// Candidate delimiters in tie-break priority order.
    pub delimiters: Vec<char>,
    /// Number of non-empty lines examined.
    pub sample_lines: usize,
    /// WHATWG encoding labels tried after the detector's guess.
    pub encodings: Vec<String>,
}

impl Default for SniffSettings {
    fn default() -> Self {
        Self {
            delimiters: vec!['|', ',', '\t', '^', '~', ';'],
            sample_lines: 20,
            encodings: vec!["utf-8".into(), "latin1".into(), "windows-1252".into()],
        }
    }
}

/// Decoded text plus the inferred delimiter.
#[derive(Debug, Clone, PartialEq)]
pub struct SniffedText {
    pub text: String,
    /// Name of the encoding that produced `text`.
    pub encoding: String,
    /// `None` when no candidate delimiter occurs in the sample.
    pub delimiter: Option<char>,
}

pub fn sniff(bytes: &[u8], settings: &SniffSettings) -> SniffedText {
    let (text, encoding) = decode(bytes, settings);
    let delimiter = detect_delimiter(&text, &settings.delimiters, settings.sample_lines);
    debug!(encoding, ?delimiter, chars = text.len(), "sniffed payload");
    SniffedText {
        text,
        encoding: encoding.to_string(),
        delimiter,
    }
}

/// Decode with the detector's guess, then the ladder, then forced replacement.
pub fn decode(bytes: &[u8], settings: &SniffSettings) -> (String, &'static str) {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let guess = detector.guess(None, true);

    let ladder = settings
        .encodings
        .iter()
        .filter_map(|label| Encoding::for_label(label.as_bytes()));

    for encoding in std::iter::once(guess).chain(ladder) {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return (text.into_owned(), encoding.name());
        }
    }

    let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    (text.into_owned(), WINDOWS_1252.name())
}

/// Pick the most frequent candidate over the first `sample_lines` non-empty lines.
pub fn detect_delimiter(text: &str, candidates: &[char], sample_lines: usize) -> Option<char> {
    let mut counts = vec![0usize; candidates.len()];
    for line in text.lines().filter(|l| !l.trim().is_empty()).take(sample_lines) {
        for ch in line.chars() {
            if let Some(i) = candidates.iter().position(|&c| c == ch) {
                counts[i] += 1;
            }
        }
    }

    let mut best: Option<(usize, usize)> = None;
    for (i, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        // strictly greater keeps the earlier candidate on ties
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((i, count));
        }
    }
    best.map(|(i, _)| candidates[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_wins_over_comma() {
        let text = "SYMBOL|LTP|OI\nXYZ|100|500\n";
        assert_eq!(detect_delimiter(text, &SniffSettings::default().delimiters, 20), Some('|'));
    }

    #[test]
    fn tie_goes_to_earlier_candidate() {
        // two pipes and two commas per line
        let text = "a|b,c|d,e\n";
        let delims = SniffSettings::default().delimiters;
        assert_eq!(detect_delimiter(text, &delims, 20), Some('|'));
    }

    #[test]
    fn no_candidates_is_undetermined() {
        let text = "SYMBOL   LTP   OI\nXYZ   100   500\n";
        assert_eq!(detect_delimiter(text, &SniffSettings::default().delimiters, 20), None);
    }

    #[test]
    fn only_sample_lines_are_counted() {
        let mut text = String::from("a,b\n");
        for _ in 0..30 {
            text.push_str("x;y;z;w\n");
        }
        assert_eq!(detect_delimiter(&text, &[',', ';'], 1), Some(','));
        assert_eq!(detect_delimiter(&text, &[',', ';'], 5), Some(';'));
    }

    #[test]
    fn decodes_utf8_and_strips_bom() {
        let bytes = b"\xEF\xBB\xBFSYMBOL,OI\nXYZ,5\n";
        let sniffed = sniff(bytes, &SniffSettings::default());
        assert!(sniffed.text.starts_with("SYMBOL"));
        assert_eq!(sniffed.delimiter, Some(','));
    }

    #[test]
    fn latin1_bytes_decode() {
        // 0xE9 is 'é' in Latin-1 and invalid as a lone UTF-8 byte
        let bytes = b"NAME,PRICE\nCaf\xE9,10\n";
        assert!(std::str::from_utf8(bytes).is_err());
        let sniffed = sniff(bytes, &SniffSettings::default());
        assert!(sniffed.text.contains("Caf"));
        assert!(!sniffed.text.contains('\u{FFFD}'));
        assert_eq!(sniffed.delimiter, Some(','));
    }

    #[test]
    fn never_fails_on_binary_noise() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let (text, _) = decode(&bytes, &SniffSettings::default());
        assert!(!text.is_empty());
    }
}
