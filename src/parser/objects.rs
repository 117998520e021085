//! PDF object model and object parsing
//!
//! The eight direct object kinds of ISO 32000-1 Section 7.3 plus the
//! indirect-object envelope and raw stream bodies, modeled as a tagged
//! sum so consumers can switch exhaustively on kind. References are
//! by-value `(object number, generation)` identifiers, never pointers,
//! so cyclic PDF graphs cannot form ownership cycles here.

use super::lexer;
use super::source::ByteSource;
use super::{ParseError, ParseResult};
use std::io::{Read, Seek};

/// PDF name object (e.g. `/Type`), stored after `#xx` decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PdfName(pub String);

impl PdfName {
    pub fn new(name: impl Into<String>) -> Self {
        PdfName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// PDF string payload, stored after escape/hex decoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PdfString(pub Vec<u8>);

impl PdfString {
    pub fn new(data: Vec<u8>) -> Self {
        PdfString(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get as UTF-8 text if possible.
    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.0)
    }
}

/// PDF array object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

impl PdfArray {
    pub fn new() -> Self {
        PdfArray(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }

    pub fn push(&mut self, obj: PdfObject) {
        self.0.push(obj);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PdfObject> {
        self.0.iter()
    }
}

/// PDF dictionary object.
///
/// Insertion order is preserved so iteration is deterministic; assigning
/// an existing key overwrites in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary {
    entries: Vec<(PdfName, PdfObject)>,
}

impl PdfDictionary {
    pub fn new() -> Self {
        PdfDictionary {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.entries
            .iter()
            .find(|(k, _)| k.0 == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite a key, keeping its original position on
    /// overwrite.
    pub fn set(&mut self, key: impl Into<String>, value: PdfObject) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| k.0 == key) {
            slot.1 = value;
        } else {
            self.entries.push((PdfName(key), value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PdfName, &PdfObject)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Value of the `/Type` key, if it is a name.
    pub fn get_type(&self) -> Option<&str> {
        self.get("Type").and_then(|o| o.as_name()).map(|n| n.as_str())
    }
}

/// Unresolved pointer to an indirect object: `N G R`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PdfReference {
    pub object_number: i64,
    pub generation: i64,
}

/// Indirect-object envelope: `N G obj … endobj`.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfIndirectObject {
    pub object_number: i64,
    pub generation: i64,
    pub object: Box<PdfObject>,
}

/// Stream object: a dictionary plus the raw (still encoded) body bytes.
/// Always appears as the payload of an indirect object, so it carries
/// the envelope identity itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub object_number: i64,
    pub generation: i64,
    pub dict: PdfDictionary,
    pub data: Vec<u8>,
}

/// PDF object kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(PdfName),
    LiteralString(PdfString),
    HexString(PdfString),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Reference(PdfReference),
    Indirect(PdfIndirectObject),
    Stream(PdfStream),
}

impl PdfObject {
    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            PdfObject::Real(r) => Some(*r),
            PdfObject::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    /// String payload of either string kind.
    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::LiteralString(s) | PdfObject::HexString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<PdfReference> {
        match self {
            PdfObject::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Serialize back to PDF syntax.
    pub fn to_pdf_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize_into(&mut out);
        out
    }

    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        match self {
            PdfObject::Null => out.extend_from_slice(b"null"),
            PdfObject::Boolean(true) => out.extend_from_slice(b"true"),
            PdfObject::Boolean(false) => out.extend_from_slice(b"false"),
            PdfObject::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            // Debug formatting keeps the decimal point so the kind
            // survives a reparse.
            PdfObject::Real(r) => out.extend_from_slice(format!("{r:?}").as_bytes()),
            PdfObject::Name(n) => serialize_name(n, out),
            PdfObject::LiteralString(s) => serialize_literal_string(s, out),
            PdfObject::HexString(s) => {
                out.push(b'<');
                for b in s.as_bytes() {
                    out.extend_from_slice(format!("{b:02X}").as_bytes());
                }
                out.push(b'>');
            }
            PdfObject::Array(a) => {
                out.push(b'[');
                for (i, item) in a.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    item.serialize_into(out);
                }
                out.push(b']');
            }
            PdfObject::Dictionary(d) => serialize_dict(d, out),
            PdfObject::Reference(r) => {
                out.extend_from_slice(format!("{} {} R", r.object_number, r.generation).as_bytes())
            }
            PdfObject::Indirect(io) => {
                out.extend_from_slice(
                    format!("{} {} obj\n", io.object_number, io.generation).as_bytes(),
                );
                io.object.serialize_into(out);
                out.extend_from_slice(b"\nendobj");
            }
            PdfObject::Stream(s) => {
                out.extend_from_slice(
                    format!("{} {} obj\n", s.object_number, s.generation).as_bytes(),
                );
                serialize_dict(&s.dict, out);
                out.extend_from_slice(b"\nstream\n");
                out.extend_from_slice(&s.data);
                out.extend_from_slice(b"\nendstream\nendobj");
            }
        }
    }
}

fn serialize_name(name: &PdfName, out: &mut Vec<u8>) {
    out.push(b'/');
    for c in name.0.chars() {
        let b = (c as u32 & 0xFF) as u8;
        if (0x21..=0x7E).contains(&b) && !lexer::is_delimiter(b) && b != b'#' {
            out.push(b);
        } else {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        }
    }
}

fn serialize_literal_string(s: &PdfString, out: &mut Vec<u8>) {
    out.push(b'(');
    for &b in s.as_bytes() {
        match b {
            b'\\' | b'(' | b')' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0C => out.extend_from_slice(b"\\f"),
            other => out.push(other),
        }
    }
    out.push(b')');
}

fn serialize_dict(dict: &PdfDictionary, out: &mut Vec<u8>) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        serialize_name(key, out);
        out.push(b' ');
        value.serialize_into(out);
    }
    out.extend_from_slice(b">>");
}

/// True when the upcoming bytes look like a number (`[+-.]*[0-9.]`).
fn is_numeric_ahead(bb: &[u8]) -> bool {
    let mut i = 0;
    while i < bb.len() && matches!(bb[i], b'+' | b'-' | b'.') {
        i += 1;
    }
    (i < bb.len() && bb[i].is_ascii_digit()) || bb[..i].contains(&b'.')
}

/// Detect the signature at the current position and parse the
/// corresponding direct object.
pub fn parse_object<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<PdfObject> {
    lexer::skip_spaces(src)?;
    loop {
        let bb = src.peek(2)?.to_vec();
        if bb.is_empty() {
            return Err(ParseError::Structural(format!(
                "unexpected end of data at offset {}",
                src.position()
            )));
        }
        match bb[0] {
            b'/' => return Ok(PdfObject::Name(lexer::parse_name(src)?)),
            b'(' => return Ok(PdfObject::LiteralString(lexer::parse_literal_string(src)?)),
            b'[' => return Ok(PdfObject::Array(parse_array(src)?)),
            b'<' if bb.get(1) == Some(&b'<') => {
                return Ok(PdfObject::Dictionary(parse_dict(src)?))
            }
            b'<' => return Ok(PdfObject::HexString(lexer::parse_hex_string(src)?)),
            b'%' => {
                lexer::skip_comments(src)?;
            }
            _ => {
                // Number, reference or keyword; peek farther to decide.
                let ahead = src.peek(15)?.to_vec();
                if ahead.starts_with(b"null") {
                    lexer::parse_null(src)?;
                    return Ok(PdfObject::Null);
                }
                if ahead.starts_with(b"true") || ahead.starts_with(b"false") {
                    return Ok(PdfObject::Boolean(lexer::parse_bool(src)?));
                }
                if let Some(m) = lexer::match_reference(&ahead) {
                    src.discard(m.len)?;
                    return Ok(PdfObject::Reference(PdfReference {
                        object_number: m.object_number,
                        generation: m.generation,
                    }));
                }
                if is_numeric_ahead(&ahead) {
                    return lexer::parse_number(src);
                }
                return Err(ParseError::Structural(format!(
                    "unexpected object pattern {:?} at offset {}",
                    String::from_utf8_lossy(&ahead),
                    src.position()
                )));
            }
        }
    }
}

/// Parse an array delimited by `[` and `]`.
fn parse_array<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<PdfArray> {
    src.discard(1)?; // consume '['
    let mut arr = PdfArray::new();
    loop {
        lexer::skip_spaces(src)?;
        let Some(b) = src.peek_byte()? else {
            return Err(ParseError::Structural(format!(
                "unterminated array at offset {}",
                src.position()
            )));
        };
        if b == b']' {
            src.discard(1)?;
            break;
        }
        arr.push(parse_object(src)?);
    }
    Ok(arr)
}

/// Parse a dictionary enclosed by `<<` and `>>`.
///
/// Known producer bug: some writers append `null` to a key without a
/// separator (`/Boundsnull`). When a parsed key ends in `null` and the
/// next token is another key, the suffix is taken as the value.
pub fn parse_dict<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<PdfDictionary> {
    if src.peek(2)? != b"<<" {
        return Err(ParseError::Structural(format!(
            "invalid dictionary start at offset {}",
            src.position()
        )));
    }
    src.discard(2)?;

    let mut dict = PdfDictionary::new();
    loop {
        lexer::skip_spaces(src)?;
        lexer::skip_comments(src)?;

        let bb = src.peek(2)?.to_vec();
        if bb.is_empty() {
            return Err(ParseError::Structural(format!(
                "unterminated dictionary at offset {}",
                src.position()
            )));
        }
        if bb.starts_with(b">>") {
            src.discard(2)?;
            break;
        }

        let key = lexer::parse_name(src)?;
        if key.0.len() > 4 && key.0.ends_with("null") {
            lexer::skip_spaces(src)?;
            if src.peek_byte()? == Some(b'/') {
                let trimmed = key.0[..key.0.len() - 4].to_string();
                log::debug!("dictionary key {:?} carries a fused null value", key.0);
                dict.set(trimmed, PdfObject::Null);
                continue;
            }
        }

        lexer::skip_spaces(src)?;
        let value = parse_object(src)?;
        dict.set(key.0, value);
    }
    Ok(dict)
}

/// Parse an indirect object at the current position. Returns either
/// [`PdfObject::Indirect`] or, when the payload dictionary is followed
/// by the `stream` keyword, [`PdfObject::Stream`].
pub fn parse_indirect_object<R: Read + Seek>(src: &mut ByteSource<R>) -> ParseResult<PdfObject> {
    let bb = src.peek(20)?.to_vec();
    let header = lexer::match_object_header(&bb).ok_or_else(|| {
        ParseError::Structural(format!(
            "unable to detect indirect object signature at offset {} ({:?})",
            src.position(),
            String::from_utf8_lossy(&bb)
        ))
    })?;
    // Tolerate a small leading offset before the header.
    src.discard(header.end)?;

    let object_number = header.object_number;
    let generation = header.generation;
    let mut payload = PdfObject::Null;

    loop {
        let bb = src.peek(2)?.to_vec();
        if bb.is_empty() {
            // Truncated envelope; keep what was parsed.
            return Ok(PdfObject::Indirect(PdfIndirectObject {
                object_number,
                generation,
                object: Box::new(payload),
            }));
        }
        if lexer::is_whitespace(bb[0]) {
            lexer::skip_spaces(src)?;
        } else if bb[0] == b'%' {
            lexer::skip_comments(src)?;
        } else if bb.starts_with(b"<<") {
            payload = PdfObject::Dictionary(parse_dict(src)?);
        } else if matches!(bb[0], b'/' | b'(' | b'[' | b'<') {
            payload = parse_object(src)?;
        } else if bb[0] == b'e' {
            let line = lexer::read_text_line(src)?;
            if line.starts_with("endobj") {
                break;
            }
        } else if bb[0] == b's' && src.peek(10)?.starts_with(b"stream") {
            let dict = match payload {
                PdfObject::Dictionary(d) => d,
                _ => {
                    return Err(ParseError::Structural(format!(
                        "stream object {object_number} missing dictionary"
                    )))
                }
            };
            let data = read_stream_body(src, object_number)?;
            return Ok(PdfObject::Stream(PdfStream {
                object_number,
                generation,
                dict,
                data,
            }));
        } else {
            payload = parse_object(src)?;
            return Ok(PdfObject::Indirect(PdfIndirectObject {
                object_number,
                generation,
                object: Box::new(payload),
            }));
        }
    }

    Ok(PdfObject::Indirect(PdfIndirectObject {
        object_number,
        generation,
        object: Box::new(payload),
    }))
}

/// Consume the `stream` keyword, its end-of-line marker and the raw body.
///
/// The body ends at the last `endstream` observed before the envelope's
/// `endobj`; a single trailing LF or CRLF is stripped. Scanning for the
/// keyword rather than trusting `/Length` lets the resolver validate and
/// correct the length afterwards.
fn read_stream_body<R: Read + Seek>(
    src: &mut ByteSource<R>,
    object_number: i64,
) -> ParseResult<Vec<u8>> {
    let bb = src.peek(10)?.to_vec();
    let mut skip = 6; // the `stream` keyword
    if bb.len() > skip {
        if lexer::is_whitespace(bb[skip]) && bb[skip] != b'\r' && bb[skip] != b'\n' {
            // Should be an EOL marker; tolerate one stray whitespace byte.
            log::debug!("object {object_number}: stream keyword line not ending with EOL marker");
            skip += 1;
        }
        if bb.get(skip) == Some(&b'\r') {
            skip += 1;
            if bb.get(skip) == Some(&b'\n') {
                skip += 1;
            }
        } else if bb.get(skip) == Some(&b'\n') {
            skip += 1;
        }
    }
    src.discard(skip)?;

    let mut buf: Vec<u8> = Vec::new();
    let mut last_end: Option<usize> = None;
    while let Some(b) = src.read_byte()? {
        buf.push(b);
        if b == b'm' && buf.len() >= 9 && buf.ends_with(b"endstream") {
            last_end = Some(buf.len() - 9);
        }
        if b == b'j' && last_end.is_some() && buf.ends_with(b"endobj") {
            break;
        }
    }

    let Some(end) = last_end else {
        return Err(ParseError::Structural(format!(
            "no endstream found for stream object {object_number}"
        )));
    };
    let mut body = &buf[..end];
    if body.ends_with(b"\r\n") {
        body = &body[..body.len() - 2];
    } else if body.ends_with(b"\n") {
        body = &body[..body.len() - 1];
    }
    Ok(body.to_vec())
}
