//! Low-level scanners over a byte source
//!
//! Whitespace and comment skipping, text lines, names, strings, numbers
//! and the lookahead matchers for references and indirect-object headers
//! (ISO 32000-1 Section 7.2 and 7.3).

use super::objects::{PdfName, PdfObject, PdfString};
use super::source::ByteSource;
use super::{ParseError, ParseResult};
use std::io::{Read, Seek};

/// PDF whitespace: space, tab, CR, LF, FF, NUL.
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0C' | b'\0')
}

/// PDF delimiter characters.
pub fn is_delimiter(b: u8) -> bool {
    matches!(b, b'/' | b'[' | b']' | b'(' | b')' | b'<' | b'>' | b'%')
}

fn is_octal_digit(b: u8) -> bool {
    (b'0'..=b'7').contains(&b)
}

/// Skip over whitespace; returns the number of bytes skipped.
pub fn skip_spaces<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<usize> {
    let mut count = 0;
    while let Some(b) = src.peek_byte()? {
        if !is_whitespace(b) {
            break;
        }
        src.discard(1)?;
        count += 1;
    }
    Ok(count)
}

/// Skip whitespace, then any number of comments and interleaved
/// whitespace. Handles multi-line comment runs.
pub fn skip_comments<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<()> {
    loop {
        skip_spaces(src)?;
        match src.peek_byte()? {
            Some(b'%') => {
                // Consume to end of line.
                while let Some(b) = src.peek_byte()? {
                    if b == b'\r' || b == b'\n' {
                        break;
                    }
                    src.discard(1)?;
                }
            }
            _ => return Ok(()),
        }
    }
}

/// Read a single line of text from the current position. The line
/// terminator is not consumed.
pub fn read_text_line<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<String> {
    let mut line = Vec::new();
    while let Some(b) = src.peek_byte()? {
        if b == b'\r' || b == b'\n' {
            break;
        }
        src.discard(1)?;
        line.push(b);
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// Parse a name object starting with `/`. `#xx` escapes decode to a
/// single byte.
pub fn parse_name<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<PdfName> {
    let mut name = String::new();
    let mut started = false;
    loop {
        let Some(b) = src.peek_byte()? else {
            // Can happen at the end of an object-stream slice.
            break;
        };
        if !started {
            if b == b'/' {
                started = true;
                src.discard(1)?;
            } else if b == b'%' {
                skip_comments(src)?;
            } else {
                return Err(ParseError::Structural(format!(
                    "invalid name starting with {:?} at offset {}",
                    b as char,
                    src.position()
                )));
            }
        } else if is_whitespace(b) {
            break;
        } else if matches!(b, b'/' | b'[' | b'(' | b']' | b'<' | b'>') {
            // Start of the next token.
            break;
        } else if b == b'#' {
            let code = src.peek(3)?.to_vec();
            if code.len() < 3 {
                return Err(ParseError::Structural(format!(
                    "incomplete hex escape in name at offset {}",
                    src.position()
                )));
            }
            let decoded = decode_hex_pair(code[1], code[2]).ok_or_else(|| {
                ParseError::Structural(format!(
                    "invalid hex escape in name at offset {}",
                    src.position()
                ))
            })?;
            src.discard(3)?;
            name.push(decoded as char);
        } else {
            src.discard(1)?;
            name.push(b as char);
        }
    }
    Ok(PdfName(name))
}

fn hex_digit_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn decode_hex_pair(hi: u8, lo: u8) -> Option<u8> {
    Some(hex_digit_value(hi)? << 4 | hex_digit_value(lo)?)
}

/// Parse an integer or real number. Exponential notation is accepted for
/// reader compatibility even though writers may not emit it. Malformed
/// numbers degrade to zero with a logged warning so that otherwise
/// recoverable documents still open.
pub fn parse_number<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<PdfObject> {
    let mut text = String::new();
    let mut is_real = false;
    let mut allow_signs = true;
    while let Some(b) = src.peek_byte()? {
        if allow_signs && (b == b'-' || b == b'+') {
            // Signs appear at the start and after an exponent marker.
            src.discard(1)?;
            text.push(b as char);
            allow_signs = false;
        } else if b.is_ascii_digit() {
            src.discard(1)?;
            text.push(b as char);
        } else if b == b'.' {
            src.discard(1)?;
            text.push(b as char);
            is_real = true;
        } else if b == b'e' {
            src.discard(1)?;
            text.push(b as char);
            is_real = true;
            allow_signs = true;
        } else {
            break;
        }
    }

    if is_real {
        let value = text.parse::<f64>().unwrap_or_else(|_| {
            log::warn!("malformed real number {text:?}, using 0.0; output may be incorrect");
            0.0
        });
        Ok(PdfObject::Real(value))
    } else {
        let value = text.parse::<i64>().unwrap_or_else(|_| {
            log::warn!("malformed integer {text:?}, using 0; output may be incorrect");
            0
        });
        Ok(PdfObject::Integer(value))
    }
}

/// Parse a literal string delimited by balanced parentheses.
pub fn parse_literal_string<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<PdfString> {
    src.discard(1)?; // consume '('
    let mut out = Vec::new();
    let mut depth = 1;
    while depth > 0 {
        let b = src.read_byte()?.ok_or_else(|| {
            ParseError::Structural(format!(
                "unterminated literal string at offset {}",
                src.position()
            ))
        })?;
        if b == b'\\' {
            let esc = src.read_byte()?.ok_or_else(|| {
                ParseError::Structural(format!(
                    "unterminated escape in string at offset {}",
                    src.position()
                ))
            })?;
            if is_octal_digit(esc) {
                // Greedy `\ddd`, up to three octal digits, one byte out.
                let mut digits = vec![esc];
                let more = src.peek(2)?.to_vec();
                for d in more {
                    if is_octal_digit(d) {
                        digits.push(d);
                    } else {
                        break;
                    }
                }
                src.discard(digits.len() - 1)?;
                let text: String = digits.iter().map(|&d| d as char).collect();
                let code = u32::from_str_radix(&text, 8).unwrap_or(0);
                out.push(code as u8);
            } else {
                out.push(match esc {
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    b'b' => b'\x08',
                    b'f' => b'\x0C',
                    b'(' | b')' | b'\\' => esc,
                    other => other,
                });
            }
        } else if b == b'(' {
            depth += 1;
            out.push(b);
        } else if b == b')' {
            depth -= 1;
            if depth > 0 {
                out.push(b);
            }
        } else {
            out.push(b);
        }
    }
    Ok(PdfString(out))
}

/// Parse a hex string delimited by `<` and `>`. Whitespace inside is
/// ignored; an odd trailing nibble is padded with `0`.
pub fn parse_hex_string<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<PdfString> {
    src.discard(1)?; // consume '<'
    let mut nibbles = Vec::new();
    loop {
        let b = src.read_byte()?.ok_or_else(|| {
            ParseError::Structural(format!(
                "unterminated hex string at offset {}",
                src.position()
            ))
        })?;
        if b == b'>' {
            break;
        }
        if is_whitespace(b) {
            continue;
        }
        match hex_digit_value(b) {
            Some(v) => nibbles.push(v),
            None => log::warn!("ignoring invalid hex string byte {:?}", b as char),
        }
    }
    if nibbles.len() % 2 == 1 {
        nibbles.push(0);
    }
    let bytes = nibbles.chunks(2).map(|p| p[0] << 4 | p[1]).collect();
    Ok(PdfString(bytes))
}

/// Parse the exact keyword `true` or `false`.
pub fn parse_bool<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<bool> {
    let bb = src.peek(5)?.to_vec();
    if bb.starts_with(b"true") {
        src.discard(4)?;
        return Ok(true);
    }
    if bb.starts_with(b"false") {
        src.discard(5)?;
        return Ok(false);
    }
    Err(ParseError::Structural(format!(
        "unexpected boolean at offset {}",
        src.position()
    )))
}

/// Parse the exact keyword `null`.
pub fn parse_null<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<()> {
    src.discard(4)?;
    Ok(())
}

/// Result of a successful reference lookahead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceMatch {
    pub object_number: i64,
    pub generation: i64,
    /// Total bytes matched, including leading whitespace and the `R`.
    pub len: usize,
}

/// Match `\s*(\d+)\s+(\d+)\s+R` at the start of `bb`.
pub fn match_reference(bb: &[u8]) -> Option<ReferenceMatch> {
    let mut i = 0;
    while i < bb.len() && is_whitespace(bb[i]) {
        i += 1;
    }
    let (object_number, next) = take_digits(bb, i)?;
    i = take_spaces(bb, next)?;
    let (generation, next) = take_digits(bb, i)?;
    i = take_spaces(bb, next)?;
    if i < bb.len() && bb[i] == b'R' {
        Some(ReferenceMatch {
            object_number,
            generation,
            len: i + 1,
        })
    } else {
        None
    }
}

/// Result of an indirect-object header lookahead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectHeaderMatch {
    /// Index of the first digit of the object number.
    pub start: usize,
    /// Index just past the `obj` keyword.
    pub end: usize,
    pub object_number: i64,
    pub generation: i64,
}

/// Find the first `(\d+)\s+(\d+)\s+obj` signature within `bb`.
pub fn match_object_header(bb: &[u8]) -> Option<ObjectHeaderMatch> {
    for start in 0..bb.len() {
        if !bb[start].is_ascii_digit() {
            continue;
        }
        // Start of a digit run only; a match inside a longer number
        // would misread the object number.
        if start > 0 && bb[start - 1].is_ascii_digit() {
            continue;
        }
        if let Some(m) = match_object_header_at(bb, start) {
            return Some(m);
        }
    }
    None
}

fn match_object_header_at(bb: &[u8], start: usize) -> Option<ObjectHeaderMatch> {
    let (object_number, i) = take_digits(bb, start)?;
    let i = take_spaces(bb, i)?;
    let (generation, i) = take_digits(bb, i)?;
    let i = take_spaces(bb, i)?;
    if bb.len() >= i + 3 && &bb[i..i + 3] == b"obj" {
        Some(ObjectHeaderMatch {
            start,
            end: i + 3,
            object_number,
            generation,
        })
    } else {
        None
    }
}

/// Match `startx?ref\s*(\d+)` anywhere in `bb`; the `startref`
/// misspelling is tolerated. Returns the offset operand.
pub fn match_startxref(bb: &[u8]) -> Option<u64> {
    for i in 0..bb.len() {
        if !bb[i..].starts_with(b"start") {
            continue;
        }
        let mut j = i + 5;
        if j < bb.len() && bb[j] == b'x' {
            j += 1;
        }
        if !bb[j..].starts_with(b"ref") {
            continue;
        }
        j += 3;
        while j < bb.len() && is_whitespace(bb[j]) {
            j += 1;
        }
        if let Some((value, _)) = take_digits(bb, j) {
            return Some(value as u64);
        }
    }
    None
}

/// Consume a run of at least one decimal digit starting at `i`.
fn take_digits(bb: &[u8], i: usize) -> Option<(i64, usize)> {
    let mut j = i;
    while j < bb.len() && bb[j].is_ascii_digit() {
        j += 1;
    }
    if j == i {
        return None;
    }
    let text = std::str::from_utf8(&bb[i..j]).ok()?;
    let value = text.parse::<i64>().ok()?;
    Some((value, j))
}

/// Consume a run of at least one whitespace byte starting at `i`.
fn take_spaces(bb: &[u8], i: usize) -> Option<usize> {
    let mut j = i;
    while j < bb.len() && is_whitespace(bb[j]) {
        j += 1;
    }
    if j == i {
        None
    } else {
        Some(j)
    }
}
