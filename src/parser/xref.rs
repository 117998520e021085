//! Cross-reference table
//!
//! The in-memory index from object number to location (ISO 32000-1
//! Section 7.5.4), shared by ASCII tables, cross-reference streams and
//! the repair scanner. Revision precedence: sections parsed earlier
//! (later in the file) win unless an older section carries a higher
//! generation.

use super::lexer;
use super::objects::{self, PdfDictionary};
use super::source::ByteSource;
use super::{ParseError, ParseResult};
use std::collections::HashMap;
use std::io::{Read, Seek};

/// Where the bytes of an object live.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XrefLocation {
    /// Uncompressed object at an absolute file offset. `next_offset`
    /// bounds the byte window for envelope reads; it is filled in by
    /// [`XrefTable::compute_next_offsets`].
    Offset { offset: u64, next_offset: u64 },
    /// Object packed inside a compressed object stream.
    InStream { stream_number: i64, index: i64 },
}

/// One cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XrefEntry {
    pub object_number: i64,
    pub generation: i64,
    pub location: XrefLocation,
}

/// Map from object number to its newest surviving entry.
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    entries: HashMap<i64, XrefEntry>,
}

impl XrefTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, object_number: i64) -> Option<&XrefEntry> {
        self.entries.get(&object_number)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &XrefEntry> {
        self.entries.values()
    }

    /// Install an uncompressed entry unless a newer one exists. Entries
    /// parsed earlier take precedence; an older section only wins with a
    /// strictly higher generation.
    pub fn insert_offset_entry(&mut self, object_number: i64, offset: u64, generation: i64) {
        match self.entries.get(&object_number) {
            Some(existing) if generation <= existing.generation => {}
            _ => {
                self.entries.insert(
                    object_number,
                    XrefEntry {
                        object_number,
                        generation,
                        location: XrefLocation::Offset {
                            offset,
                            next_offset: 0,
                        },
                    },
                );
            }
        }
    }

    /// Install a compressed-object entry only when the number is still
    /// unknown.
    pub fn insert_stream_entry(&mut self, object_number: i64, stream_number: i64, index: i64) {
        self.entries.entry(object_number).or_insert(XrefEntry {
            object_number,
            generation: 0,
            location: XrefLocation::InStream {
                stream_number,
                index,
            },
        });
    }

    /// Install an entry found by the repair scanner. The scan runs
    /// top-down, so a later occurrence of the same number supersedes an
    /// earlier one unless its generation is lower.
    pub fn insert_rebuilt_entry(&mut self, object_number: i64, offset: u64, generation: i64) {
        match self.entries.get(&object_number) {
            Some(existing) if generation < existing.generation => {}
            _ => {
                self.entries.insert(
                    object_number,
                    XrefEntry {
                        object_number,
                        generation,
                        location: XrefLocation::Offset {
                            offset,
                            next_offset: 0,
                        },
                    },
                );
            }
        }
    }

    /// For every uncompressed entry, record the smallest strictly
    /// greater offset in the table (or the file size for the last
    /// object). This bounds envelope reads so stream bodies can be
    /// captured without resolving `/Length` first.
    pub fn compute_next_offsets(&mut self, file_size: u64) {
        let mut offsets: Vec<(i64, u64)> = self
            .entries
            .values()
            .filter_map(|e| match e.location {
                XrefLocation::Offset { offset, .. } => Some((e.object_number, offset)),
                XrefLocation::InStream { .. } => None,
            })
            .collect();
        offsets.sort_by_key(|&(_, offset)| offset);

        for i in 0..offsets.len() {
            let (object_number, offset) = offsets[i];
            let next = offsets[i + 1..]
                .iter()
                .map(|&(_, o)| o)
                .find(|&o| o > offset)
                .unwrap_or(file_size);
            if let Some(entry) = self.entries.get_mut(&object_number) {
                entry.location = XrefLocation::Offset {
                    offset,
                    next_offset: next,
                };
            }
        }
    }
}

/// Match an xref subsection header line: `first count`.
fn match_subsection(line: &str) -> Option<(i64, i64)> {
    let mut it = line.split_whitespace();
    let first = it.next()?.parse::<i64>().ok()?;
    let count = it.next()?.parse::<i64>().ok()?;
    if it.next().is_some() {
        return None;
    }
    Some((first, count))
}

/// Match an xref entry line: `offset generation n|f`.
fn match_entry(line: &str) -> Option<(u64, i64, char)> {
    let mut it = line.split_whitespace();
    let offset = it.next()?.parse::<u64>().ok()?;
    let generation = it.next()?.parse::<i64>().ok()?;
    let flag = it.next()?;
    if it.next().is_some() || flag.len() != 1 {
        return None;
    }
    let flag = flag.chars().next()?;
    if flag == 'n' || flag == 'f' {
        Some((offset, generation, flag))
    } else {
        None
    }
}

/// Parse a conventional ASCII xref section at the current position (the
/// cursor sits on the `xref` keyword line). Entries merge into `table`
/// under the usual precedence; the section's trailer dictionary is
/// returned.
pub(crate) fn parse_xref_table<R: Read + Seek>(
    src: &mut ByteSource<R>,
    table: &mut XrefTable,
) -> ParseResult<PdfDictionary> {
    let first_line = lexer::read_text_line(src)?;
    log::trace!("xref first line: {first_line}");

    let mut current_number: i64 = -1;
    let mut inside_subsection = false;
    loop {
        lexer::skip_spaces(src)?;
        if src.peek_byte()?.is_none() {
            return Err(ParseError::Structural(
                "unexpected end of file inside xref table".to_string(),
            ));
        }
        let line = lexer::read_text_line(src)?;

        if let Some((first, count)) = match_subsection(line.trim()) {
            current_number = first;
            inside_subsection = true;
            log::trace!("xref subsection: first object {first}, {count} objects");
            continue;
        }

        if let Some((offset, generation, flag)) = match_entry(line.trim()) {
            if !inside_subsection {
                return Err(ParseError::Structural(
                    "xref entry outside of a subsection".to_string(),
                ));
            }
            // Offsets 0 and 1 are free regardless of the flag: some
            // writers mark free objects 'n' with a zero offset, or point
            // at the version header.
            if flag == 'n' && offset > 1 {
                table.insert_offset_entry(current_number, offset, generation);
            } else if flag == 'n' {
                log::debug!(
                    "xref entry for object {current_number} marked in-use at offset {offset}, treating as free"
                );
            }
            current_number += 1;
            continue;
        }

        if line.starts_with("trailer") {
            // The line may already hold the start of the dictionary;
            // rewind to just after the keyword.
            if line.len() > 7 {
                let pos = src.position();
                src.seek_to(pos - (line.len() as u64 - 7))?;
            }
            lexer::skip_spaces(src)?;
            lexer::skip_comments(src)?;
            return objects::parse_dict(src);
        }

        if line == "%%EOF" {
            return Err(ParseError::Structural(
                "end of file reached before xref trailer".to_string(),
            ));
        }

        log::trace!("skipping unrecognized xref line: {line:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source(data: &[u8]) -> ByteSource<Cursor<Vec<u8>>> {
        ByteSource::new(Cursor::new(data.to_vec())).unwrap()
    }

    #[test]
    fn test_match_entry_lines() {
        assert_eq!(
            match_entry("0000000009 00000 n"),
            Some((9, 0, 'n'))
        );
        assert_eq!(
            match_entry("0000000000 65535 f "),
            Some((0, 65535, 'f'))
        );
        assert_eq!(match_entry("12 0 obj"), None);
        assert_eq!(match_entry("0 2"), None);
    }

    #[test]
    fn test_match_subsection_lines() {
        assert_eq!(match_subsection("0 2"), Some((0, 2)));
        assert_eq!(match_subsection("17 120"), Some((17, 120)));
        assert_eq!(match_subsection("xref"), None);
        assert_eq!(match_subsection("0 2 n"), None);
    }

    #[test]
    fn test_parse_table_basic() {
        let data = b"xref\n0 3\n0000000000 65535 f \n0000000009 00000 n \n0000000074 00000 n \ntrailer\n<</Size 3/Root 1 0 R>>\n";
        let mut table = XrefTable::new();
        let trailer = parse_xref_table(&mut source(data), &mut table).unwrap();
        assert_eq!(trailer.get("Size").unwrap().as_integer(), Some(3));
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get(1).unwrap().location,
            XrefLocation::Offset {
                offset: 9,
                next_offset: 0
            }
        );
        assert!(table.get(0).is_none()); // free entry
    }

    #[test]
    fn test_parse_table_trailer_on_same_line() {
        let data = b"xref\n0 1\n0000000000 65535 f \ntrailer << /Size 1 >>\n";
        let mut table = XrefTable::new();
        let trailer = parse_xref_table(&mut source(data), &mut table).unwrap();
        assert_eq!(trailer.get("Size").unwrap().as_integer(), Some(1));
    }

    #[test]
    fn test_parse_table_multiple_subsections() {
        let data =
            b"xref\n0 1\n0000000000 65535 f \n10 2\n0000000100 00000 n \n0000000200 00001 n \ntrailer<</Size 12>>";
        let mut table = XrefTable::new();
        parse_xref_table(&mut source(data), &mut table).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(10).unwrap().generation, 0);
        assert_eq!(table.get(11).unwrap().generation, 1);
    }

    #[test]
    fn test_parse_table_offset_one_treated_as_free() {
        let data = b"xref\n0 2\n0000000001 00000 n \n0000000050 00000 n \ntrailer<</Size 2>>";
        let mut table = XrefTable::new();
        parse_xref_table(&mut source(data), &mut table).unwrap();
        assert!(table.get(0).is_none());
        assert!(table.get(1).is_some());
    }

    #[test]
    fn test_parse_table_entry_without_subsection_is_error() {
        let data = b"xref\n0000000009 00000 n \ntrailer<</Size 1>>";
        let mut table = XrefTable::new();
        assert!(parse_xref_table(&mut source(data), &mut table).is_err());
    }

    #[test]
    fn test_parse_table_eof_before_trailer_is_error() {
        let data = b"xref\n0 1\n0000000000 65535 f \n%%EOF";
        let mut table = XrefTable::new();
        assert!(parse_xref_table(&mut source(data), &mut table).is_err());
    }

    #[test]
    fn test_precedence_newer_section_wins() {
        let mut table = XrefTable::new();
        // Primary section (parsed first) installs the entry.
        table.insert_offset_entry(5, 100, 0);
        // Older Prev section must not override it.
        table.insert_offset_entry(5, 900, 0);
        assert_eq!(
            table.get(5).unwrap().location,
            XrefLocation::Offset {
                offset: 100,
                next_offset: 0
            }
        );
        // Unless it carries a higher generation.
        table.insert_offset_entry(5, 300, 2);
        assert_eq!(table.get(5).unwrap().generation, 2);
    }

    #[test]
    fn test_stream_entry_never_overrides() {
        let mut table = XrefTable::new();
        table.insert_offset_entry(7, 64, 0);
        table.insert_stream_entry(7, 3, 1);
        assert!(matches!(
            table.get(7).unwrap().location,
            XrefLocation::Offset { .. }
        ));

        table.insert_stream_entry(8, 3, 2);
        assert!(matches!(
            table.get(8).unwrap().location,
            XrefLocation::InStream {
                stream_number: 3,
                index: 2
            }
        ));
    }

    #[test]
    fn test_compute_next_offsets() {
        let mut table = XrefTable::new();
        table.insert_offset_entry(1, 10, 0);
        table.insert_offset_entry(2, 50, 0);
        table.insert_offset_entry(3, 30, 0);
        table.insert_stream_entry(4, 9, 0);
        table.compute_next_offsets(100);

        let next = |n: i64| match table.get(n).unwrap().location {
            XrefLocation::Offset { next_offset, .. } => next_offset,
            _ => panic!("expected offset entry"),
        };
        assert_eq!(next(1), 30);
        assert_eq!(next(3), 50);
        assert_eq!(next(2), 100);
    }

    #[test]
    fn test_compute_next_offsets_skips_duplicates() {
        let mut table = XrefTable::new();
        table.insert_offset_entry(1, 20, 0);
        table.insert_offset_entry(2, 20, 0);
        table.insert_offset_entry(3, 60, 0);
        table.compute_next_offsets(100);
        for n in [1, 2] {
            match table.get(n).unwrap().location {
                XrefLocation::Offset { next_offset, .. } => assert_eq!(next_offset, 60),
                _ => panic!("expected offset entry"),
            }
        }
    }
}
