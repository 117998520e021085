//! Repair scans for malformed files
//!
//! Three strategies, used in escalating order: relocate the xref near a
//! bad `startxref` offset, seek the last `xref` marker from the end of
//! the file, and as a last resort rebuild the whole index by scanning
//! for `N G obj` signatures top-down.

use super::lexer;
use super::source::ByteSource;
use super::xref::XrefTable;
use super::{ParseError, ParseResult};
use std::io::{Read, Seek};

/// Window size for the localized scans.
const SCAN_WINDOW: u64 = 1000;

/// Find the last `xref` marker in a window of up to [`SCAN_WINDOW`]
/// bytes ending at `near`. Used when `startxref` points outside the
/// file; the real section usually sits close by.
pub(crate) fn locate_xref<R: Read + Seek>(
    src: &mut ByteSource<R>,
    near: u64,
) -> ParseResult<u64> {
    let start = near.saturating_sub(SCAN_WINDOW);
    src.seek_to(start)?;
    let window = src.read_up_to((near - start) as usize)?;
    match find_last_xref_marker(&window) {
        Some(idx) => Ok(start + idx as u64),
        None => Err(ParseError::Structural(
            "repair: xref marker not found near startxref".to_string(),
        )),
    }
}

/// Scan backward from the end of the file in fixed-size windows for the
/// last `xref` marker, then leave the cursor on its `x`.
pub(crate) fn seek_xref_marker<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<()> {
    let file_size = src.size();
    let mut back = 0u64;
    while back < file_size {
        let len = SCAN_WINDOW.min(file_size - back);
        let start = file_size - back - len;
        src.seek_to(start)?;
        let window = src.read_up_to(len as usize)?;
        if let Some(idx) = find_last_xref_marker(&window) {
            src.seek_to(start + idx as u64)?;
            // Land on the 'x' itself.
            while let Some(b) = src.peek_byte()? {
                if !lexer::is_whitespace(b) {
                    break;
                }
                src.discard(1)?;
            }
            return Ok(());
        }
        back += len;
    }
    Err(ParseError::Structural(
        "repair: no xref marker found in file".to_string(),
    ))
}

/// Last match of `\sxref\s` in `window`, returned as the index of the
/// leading whitespace byte.
fn find_last_xref_marker(window: &[u8]) -> Option<usize> {
    let mut found = None;
    for i in 0..window.len().saturating_sub(5) {
        if lexer::is_whitespace(window[i])
            && &window[i + 1..i + 5] == b"xref"
            && window
                .get(i + 5)
                .map(|&b| lexer::is_whitespace(b))
                .unwrap_or(true)
        {
            found = Some(i);
        }
    }
    found
}

/// Rebuild the cross-reference index from scratch by scanning the whole
/// file for `N G obj` headers. For duplicate numbers the later
/// occurrence wins unless its generation is lower, matching how
/// incremental updates append newer revisions.
pub(crate) fn rebuild_xrefs_top_down<R: Read + Seek>(
    src: &mut ByteSource<R>,
) -> ParseResult<XrefTable> {
    src.seek_to(0)?;
    let data = src.read_to_end_vec()?;

    let mut table = XrefTable::new();
    let mut pos = 0;
    while pos < data.len() {
        let Some(m) = lexer::match_object_header(&data[pos..]) else {
            break;
        };
        let offset = (pos + m.start) as u64;
        table.insert_rebuilt_entry(m.object_number, offset, m.generation);
        pos += m.end;
    }
    log::debug!("rebuilt xref table with {} entries", table.len());
    Ok(table)
}
