//! PDF header and version recognition
//!
//! ISO 32000-1 Section 7.5.2: the file begins with `%PDF-M.m`. Files
//! with junk prepended are recovered by scanning for the marker
//! top-down.

use super::source::ByteSource;
use super::{ParseError, ParseResult};
use std::fmt;
use std::io::{Read, Seek};

/// PDF version as found in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Parse the version from the first 20 bytes of the file, falling back
/// to a top-down scan when the marker is not at the start.
pub fn parse_version<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<PdfVersion> {
    src.seek_to(0)?;
    let head = src.peek(20)?.to_vec();
    if let Some(version) = find_version_marker(&head) {
        log::debug!("pdf version {version}");
        return Ok(version);
    }
    seek_version_top_down(src)
}

/// Match `%PDF-M.m` anywhere inside `bb`.
fn find_version_marker(bb: &[u8]) -> Option<PdfVersion> {
    for window in bb.windows(8) {
        if window.starts_with(b"%PDF-")
            && window[5].is_ascii_digit()
            && window[6] == b'.'
            && window[7].is_ascii_digit()
        {
            return Some(PdfVersion::new(window[5] - b'0', window[7] - b'0'));
        }
    }
    None
}

/// Scan the whole file for the version marker with a rolling window.
/// Used when the header is not in the leading bytes.
fn seek_version_top_down<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<PdfVersion> {
    src.seek_to(0)?;
    let mut last = [0u8; 7];
    while let Some(b) = src.read_byte()? {
        if b.is_ascii_digit()
            && last[6] == b'.'
            && last[5].is_ascii_digit()
            && last[4] == b'-'
            && last[3] == b'F'
            && last[2] == b'D'
            && last[1] == b'P'
            && last[0] == b'%'
        {
            return Ok(PdfVersion::new(last[5] - b'0', b - b'0'));
        }
        last.rotate_left(1);
        last[6] = b;
    }
    Err(ParseError::Structural(
        "pdf version marker not found".to_string(),
    ))
}
