//! Compressed object streams
//!
//! ISO 32000-1 Section 7.5.7: an `ObjStm` stream concatenates several
//! direct objects behind a prefix table of `(object number, relative
//! offset)` pairs. Members are handed back to the envelope parser as
//! synthesized `N 0 obj … endobj` byte slices so the rest of the
//! resolver never sees the wrapping.

use super::objects::{self, PdfStream};
use super::source::ByteSource;
use super::{ParseError, ParseResult};
use std::collections::HashMap;
use std::io::Cursor;

/// A decoded object stream: the payload bytes plus the byte range of
/// every member.
#[derive(Debug)]
pub struct ObjectStream {
    data: Vec<u8>,
    /// object number -> (start, end) within `data`
    offsets: HashMap<i64, (usize, usize)>,
}

impl ObjectStream {
    /// Validate the `ObjStm` dictionary and parse the offset table from
    /// the decoded payload.
    pub fn parse(stream: &PdfStream, decoded: Vec<u8>) -> ParseResult<Self> {
        let dict = &stream.dict;
        let type_name = dict.get("Type").and_then(|o| o.as_name()).ok_or_else(|| {
            ParseError::Semantic(format!(
                "object stream {} missing Type",
                stream.object_number
            ))
        })?;
        if !type_name.as_str().eq_ignore_ascii_case("objstm") {
            return Err(ParseError::Semantic(format!(
                "object stream {} has Type {:?}, expected ObjStm",
                stream.object_number,
                type_name.as_str()
            )));
        }

        let n = dict
            .get("N")
            .and_then(|o| o.as_integer())
            .ok_or_else(|| {
                ParseError::Semantic(format!("invalid N in object stream {}", stream.object_number))
            })?;
        let first = dict
            .get("First")
            .and_then(|o| o.as_integer())
            .ok_or_else(|| {
                ParseError::Semantic(format!(
                    "invalid First in object stream {}",
                    stream.object_number
                ))
            })?;
        if n < 0 || first < 0 {
            return Err(ParseError::Range(format!(
                "negative N or First in object stream {}",
                stream.object_number
            )));
        }

        // The offset table is plain text at the head of the payload.
        let mut src = ByteSource::new(Cursor::new(decoded.clone()))?;
        let mut pairs = Vec::new();
        for _ in 0..n {
            super::lexer::skip_spaces(&mut src)?;
            let number = objects::parse_object(&mut src)?
                .as_integer()
                .ok_or_else(|| {
                    ParseError::Semantic("invalid object stream offset table".to_string())
                })?;
            super::lexer::skip_spaces(&mut src)?;
            let relative = objects::parse_object(&mut src)?
                .as_integer()
                .ok_or_else(|| {
                    ParseError::Semantic("invalid object stream offset table".to_string())
                })?;
            pairs.push((number, relative));
        }

        let mut offsets = HashMap::with_capacity(pairs.len());
        for (i, &(number, relative)) in pairs.iter().enumerate() {
            let start = (first + relative) as usize;
            if start > decoded.len() {
                return Err(ParseError::Range(format!(
                    "object {number} starts past the end of object stream {}",
                    stream.object_number
                )));
            }
            // Each member ends where the next listed one begins.
            let end = match pairs.get(i + 1) {
                Some(&(_, next_relative)) => ((first + next_relative) as usize).min(decoded.len()),
                None => decoded.len(),
            };
            offsets.insert(number, (start, end.max(start)));
        }

        Ok(ObjectStream {
            data: decoded,
            offsets,
        })
    }

    /// True when the stream's offset table lists `object_number`.
    pub fn contains(&self, object_number: i64) -> bool {
        self.offsets.contains_key(&object_number)
    }

    /// Synthesize envelope bytes for a member so the indirect-object
    /// parser can consume them unchanged: `"<n> 0 obj\n<body>endobj\n"`.
    pub fn wrapped_bytes(&self, object_number: i64) -> Option<Vec<u8>> {
        let &(start, end) = self.offsets.get(&object_number)?;
        let body = &self.data[start..end];
        let mut out = Vec::with_capacity(body.len() + 32);
        out.extend_from_slice(format!("{object_number} 0 obj\n").as_bytes());
        out.extend_from_slice(body);
        if !body.ends_with(b"\n") {
            out.push(b'\n');
        }
        out.extend_from_slice(b"endobj\n");
        Some(out)
    }
}
