//! PDF parser
//!
//! [`PdfParser`] owns the byte source and the cross-reference state and
//! exposes the file's object graph: `lookup_by_number`,
//! `lookup_by_reference` and `trace`, plus the trailer, version and
//! encryption hooks.
//!
//! Lookups may be issued concurrently over a single instance. Each
//! shared resource sits behind its own mutex: the source cursor is held
//! for the duration of one logical read, the xref lock orders rebuilds
//! against lookups, and the caches tolerate redundant parses (the later
//! write wins, which is safe because parsed objects are value-equal).

use super::encryption::{Crypter, CrypterFactory};
use super::filters::{StandardFilter, StreamFilter};
use super::header::{self, PdfVersion};
use super::object_stream::ObjectStream;
use super::objects::{self, PdfDictionary, PdfIndirectObject, PdfObject, PdfReference, PdfStream};
use super::repair;
use super::source::ByteSource;
use super::trailer::PdfTrailer;
use super::xref::{self, XrefLocation, XrefTable};
use super::xref_stream;
use super::{ParseError, ParseResult};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Pluggable collaborators for a parser instance.
#[derive(Clone)]
pub struct ParseOptions {
    /// Decodes stream bodies; defaults to [`StandardFilter`].
    pub stream_filter: Arc<dyn StreamFilter>,
    /// Builds a crypter from the trailer's `/Encrypt` dictionary. When
    /// absent, encrypted files still open but objects stay encrypted.
    pub crypter_factory: Option<Arc<dyn CrypterFactory>>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            stream_filter: Arc::new(StandardFilter::new()),
            crypter_factory: None,
        }
    }
}

/// Parser for a single PDF file, exposing its logical object graph.
pub struct PdfParser<R: Read + Seek> {
    version: PdfVersion,
    file_size: u64,
    source: Mutex<ByteSource<R>>,
    xrefs: Mutex<XrefTable>,
    trailer: PdfTrailer,
    object_cache: Mutex<HashMap<i64, Arc<PdfObject>>>,
    object_streams: Mutex<HashMap<i64, Arc<ObjectStream>>>,
    /// Object numbers with a stream-`Length` lookup underway; breaks
    /// self-referential and cyclic `/Length` chains.
    length_refs_in_progress: Mutex<HashSet<i64>>,
    crypter: Mutex<Option<Arc<dyn Crypter>>>,
    filter: Arc<dyn StreamFilter>,
    crypter_factory: Option<Arc<dyn CrypterFactory>>,
}

impl<R: Read + Seek> std::fmt::Debug for PdfParser<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfParser")
            .field("version", &self.version)
            .field("file_size", &self.file_size)
            .field("trailer", &self.trailer)
            .finish_non_exhaustive()
    }
}

impl PdfParser<File> {
    /// Open a PDF file from a path.
    pub fn open<P: AsRef<Path>>(path: P) -> ParseResult<Self> {
        Self::new(File::open(path)?)
    }
}

impl<R: Read + Seek> PdfParser<R> {
    /// Open a PDF from a seekable byte source, loading the
    /// cross-reference data and trailer.
    pub fn new(rs: R) -> ParseResult<Self> {
        Self::with_options(rs, ParseOptions::default())
    }

    pub fn with_options(rs: R, options: ParseOptions) -> ParseResult<Self> {
        let mut src = ByteSource::new(rs)?;
        let file_size = src.size();

        let mut xrefs = XrefTable::new();
        let trailer_dict = load_xrefs(&mut src, &mut xrefs, &*options.stream_filter)?;
        xrefs.compute_next_offsets(file_size);
        if xrefs.is_empty() {
            return Err(ParseError::Structural(
                "empty cross reference table".to_string(),
            ));
        }

        let version = header::parse_version(&mut src)?;

        Ok(PdfParser {
            version,
            file_size,
            source: Mutex::new(src),
            xrefs: Mutex::new(xrefs),
            trailer: PdfTrailer::from_dict(trailer_dict),
            object_cache: Mutex::new(HashMap::new()),
            object_streams: Mutex::new(HashMap::new()),
            length_refs_in_progress: Mutex::new(HashSet::new()),
            crypter: Mutex::new(None),
            filter: options.stream_filter,
            crypter_factory: options.crypter_factory,
        })
    }

    /// The version from the file header.
    pub fn version(&self) -> PdfVersion {
        self.version
    }

    /// The newest revision's trailer dictionary.
    pub fn trailer(&self) -> &PdfDictionary {
        self.trailer.dict()
    }

    /// Object numbers currently present in the cross-reference index.
    pub fn indexed_object_numbers(&self) -> Vec<i64> {
        let mut numbers: Vec<i64> = self
            .xrefs
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.object_number)
            .collect();
        numbers.sort_unstable();
        numbers
    }

    /// Look up an object by number. An undefined number is not an
    /// error: it resolves to an indirect object wrapping null.
    pub fn lookup_by_number(&self, object_number: i64) -> ParseResult<Arc<PdfObject>> {
        self.lookup_by_number_wrapper(object_number, true)
    }

    /// Look up the target of a reference.
    pub fn lookup_by_reference(&self, reference: &PdfReference) -> ParseResult<Arc<PdfObject>> {
        self.lookup_by_number(reference.object_number)
    }

    /// Resolve `obj` to a direct object. References are resolved one
    /// level; a reference chained to another reference is rejected.
    pub fn trace(&self, obj: &PdfObject) -> ParseResult<PdfObject> {
        let PdfObject::Reference(reference) = obj else {
            return Ok(obj.clone());
        };
        let resolved = self.lookup_by_reference(reference)?;
        match resolved.as_ref() {
            PdfObject::Indirect(io) => {
                if matches!(io.object.as_ref(), PdfObject::Reference(_)) {
                    return Err(ParseError::Recursion(format!(
                        "object {} resolves to another reference",
                        reference.object_number
                    )));
                }
                Ok(io.object.as_ref().clone())
            }
            other => Ok(other.clone()),
        }
    }

    /// Check whether the document is encrypted. On the first call for
    /// an encrypted file, constructs the crypter through the installed
    /// factory (when one was supplied).
    pub fn is_encrypted(&self) -> ParseResult<bool> {
        if self.crypter.lock().unwrap().is_some() {
            return Ok(true);
        }
        let Some(enc_ref) = self.trailer.encrypt() else {
            return Ok(false);
        };
        let obj = self.lookup_by_reference(&enc_ref)?;
        let enc_dict = match obj.as_ref() {
            PdfObject::Indirect(io) => match io.object.as_ref() {
                PdfObject::Dictionary(d) => d.clone(),
                _ => {
                    return Err(ParseError::Semantic(
                        "trailer Encrypt object is not a dictionary".to_string(),
                    ))
                }
            },
            _ => {
                return Err(ParseError::Semantic(
                    "encryption object is not an indirect object".to_string(),
                ))
            }
        };
        if let Some(factory) = &self.crypter_factory {
            let crypter = factory.make(&enc_dict, self.trailer.dict())?;
            *self.crypter.lock().unwrap() = Some(Arc::from(crypter));
        }
        Ok(true)
    }

    /// Authenticate with `password`, falling back to the empty
    /// password. `is_encrypted` must have constructed the crypter
    /// first.
    pub fn decrypt(&self, password: &[u8]) -> ParseResult<bool> {
        let Some(crypter) = self.crypter() else {
            return Err(ParseError::Semantic(
                "encryption must be checked before decrypting".to_string(),
            ));
        };
        if crypter.authenticate(password)? {
            return Ok(true);
        }
        crypter.authenticate(b"")
    }

    fn crypter(&self) -> Option<Arc<dyn Crypter>> {
        self.crypter.lock().unwrap().clone()
    }

    fn from_object_cache(&self, object_number: i64) -> Option<Arc<PdfObject>> {
        self.object_cache
            .lock()
            .unwrap()
            .get(&object_number)
            .cloned()
    }

    fn to_object_cache(&self, object_number: i64, obj: Arc<PdfObject>) {
        self.object_cache
            .lock()
            .unwrap()
            .insert(object_number, obj);
    }

    fn xref_entry(&self, object_number: i64) -> Option<xref::XrefEntry> {
        self.xrefs.lock().unwrap().get(object_number).copied()
    }

    /// Cache check, fetch/parse, decryption hook, cache fill.
    fn lookup_by_number_wrapper(
        &self,
        object_number: i64,
        attempt_repairs: bool,
    ) -> ParseResult<Arc<PdfObject>> {
        if let Some(hit) = self.from_object_cache(object_number) {
            return Ok(hit);
        }

        let (mut obj, from_object_stream, cacheable) =
            self.parse_object_by_number(object_number, attempt_repairs)?;

        // Members of object streams are decrypted wholesale with their
        // container, never individually.
        if !from_object_stream {
            if let Some(crypter) = self.crypter() {
                if !crypter.is_decrypted(&obj) {
                    let (num, gen) =
                        envelope_identity(&obj).unwrap_or((object_number, 0));
                    crypter.decrypt(&mut obj, num, gen)?;
                }
            }
        }

        let obj = Arc::new(obj);
        if cacheable {
            self.to_object_cache(object_number, obj.clone());
        }
        Ok(obj)
    }

    /// Fetch the object's bytes, parse the envelope, and run the
    /// post-parse validations. The repair flag is cleared on the retry
    /// so a pathological file cannot loop.
    fn parse_object_by_number(
        &self,
        object_number: i64,
        attempt_repairs: bool,
    ) -> ParseResult<(PdfObject, bool, bool)> {
        let fetched = self.fetch_object_bytes(object_number, &mut Vec::new())?;
        let Some((bytes, from_object_stream)) = fetched else {
            // An indirect reference to an undefined object is not an
            // error for a conforming reader; it reads as null. The
            // synthesized wrapper is not cached.
            log::trace!("object {object_number} not in xrefs, returning null object");
            return Ok((
                PdfObject::Indirect(PdfIndirectObject {
                    object_number,
                    generation: 0,
                    object: Box::new(PdfObject::Null),
                }),
                false,
                false,
            ));
        };

        let mut window = ByteSource::new(Cursor::new(bytes))?;
        let mut obj = match objects::parse_indirect_object(&mut window) {
            Ok(obj) => obj,
            Err(err) if attempt_repairs && err.is_structural() => {
                // Offset pointing at a non-object; rebuild top-down.
                log::warn!("failed reading object {object_number} ({err}), rebuilding xrefs");
                self.rebuild_xrefs()?;
                return self.parse_object_by_number(object_number, false);
            }
            Err(err) => return Err(err),
        };

        // Validate before the identity check: a recursive `/Length`
        // chain must surface as a recursion error, not disappear into a
        // rebuild of the already-bad entry.
        if let PdfObject::Stream(stream) = &mut obj {
            self.validate_stream_length(stream)?;
        }

        if let Some((real_number, _)) = envelope_identity(&obj) {
            if real_number != object_number {
                if attempt_repairs {
                    log::warn!(
                        "xref entry for object {object_number} yields object {real_number}, rebuilding"
                    );
                    self.rebuild_xrefs()?;
                    return self.parse_object_by_number(object_number, false);
                }
                return Err(ParseError::Structural(format!(
                    "object {object_number} still resolves to object {real_number} after rebuild"
                )));
            }
        }

        Ok((obj, from_object_stream, true))
    }

    /// Map an object number to raw envelope bytes. Uncompressed entries
    /// read the xref-bounded window `[offset, next_offset)` under the
    /// source lock; compressed entries go through the object-stream
    /// cache. `loading` carries the containers on the current chain to
    /// break container cycles.
    fn fetch_object_bytes(
        &self,
        object_number: i64,
        loading: &mut Vec<i64>,
    ) -> ParseResult<Option<(Vec<u8>, bool)>> {
        let Some(entry) = self.xref_entry(object_number) else {
            return Ok(None);
        };
        match entry.location {
            XrefLocation::Offset {
                offset,
                next_offset,
            } => {
                let end = if next_offset > offset {
                    next_offset
                } else {
                    self.file_size
                };
                let mut src = self.source.lock().unwrap();
                src.seek_to(offset)?;
                let bytes = src.read_up_to(end.saturating_sub(offset) as usize)?;
                Ok(Some((bytes, false)))
            }
            XrefLocation::InStream { stream_number, .. } => {
                if stream_number == object_number {
                    return Err(ParseError::Recursion(format!(
                        "object stream {stream_number} claims to contain itself"
                    )));
                }
                if self.xref_entry(stream_number).is_none() {
                    return Err(ParseError::Structural(format!(
                        "object {object_number} belongs to non cross referenced stream {stream_number}"
                    )));
                }
                let object_stream = self.load_object_stream(stream_number, loading)?;
                match object_stream.wrapped_bytes(object_number) {
                    Some(bytes) => Ok(Some((bytes, true))),
                    None => Err(ParseError::Structural(format!(
                        "object {object_number} not found in object stream {stream_number}"
                    ))),
                }
            }
        }
    }

    fn load_object_stream(
        &self,
        stream_number: i64,
        loading: &mut Vec<i64>,
    ) -> ParseResult<Arc<ObjectStream>> {
        if let Some(hit) = self
            .object_streams
            .lock()
            .unwrap()
            .get(&stream_number)
            .cloned()
        {
            return Ok(hit);
        }
        if loading.contains(&stream_number) {
            return Err(ParseError::Recursion(format!(
                "object stream {stream_number} is reached through itself"
            )));
        }
        loading.push(stream_number);
        let loaded = self.load_object_stream_uncached(stream_number, loading);
        loading.pop();
        let object_stream = Arc::new(loaded?);
        self.object_streams
            .lock()
            .unwrap()
            .insert(stream_number, object_stream.clone());
        Ok(object_stream)
    }

    fn load_object_stream_uncached(
        &self,
        stream_number: i64,
        loading: &mut Vec<i64>,
    ) -> ParseResult<ObjectStream> {
        let Some((bytes, _)) = self.fetch_object_bytes(stream_number, loading)? else {
            return Err(ParseError::Structural(format!(
                "missing object stream with number {stream_number}"
            )));
        };
        let mut window = ByteSource::new(Cursor::new(bytes))?;
        let obj = objects::parse_indirect_object(&mut window)?;
        let PdfObject::Stream(_) = &obj else {
            return Err(ParseError::Structural(format!(
                "object {stream_number} is not a stream"
            )));
        };
        if let Some(crypter) = self.crypter() {
            if !crypter.is_decrypted(&obj) {
                return Err(ParseError::Semantic(format!(
                    "object stream {stream_number} must be decrypted before use"
                )));
            }
        }
        let PdfObject::Stream(stream) = obj else {
            return Err(ParseError::Structural(format!(
                "object {stream_number} is not a stream"
            )));
        };
        let decoded = self.filter.decode(&stream)?;
        ObjectStream::parse(&stream, decoded)
    }

    /// Require the stream's `/Length` to trace to a non-negative
    /// integer. A disagreement with the captured body is corrected in
    /// favor of the body, whose extent the xref already bounded.
    fn validate_stream_length(&self, stream: &mut PdfStream) -> ParseResult<()> {
        let length_obj = stream.dict.get("Length").cloned().unwrap_or(PdfObject::Null);
        let traced = self.trace_stream_length(stream.object_number, &length_obj)?;
        let Some(length) = traced.as_integer() else {
            return Err(ParseError::Semantic(format!(
                "stream {} Length must be an integer",
                stream.object_number
            )));
        };
        if length < 0 {
            return Err(ParseError::Semantic(format!(
                "stream {} has negative Length {length}",
                stream.object_number
            )));
        }
        if length as usize != stream.data.len() {
            log::debug!(
                "stream {}: Length {} disagrees with captured body ({} bytes), correcting",
                stream.object_number,
                length,
                stream.data.len()
            );
            stream
                .dict
                .set("Length", PdfObject::Integer(stream.data.len() as i64));
        }
        Ok(())
    }

    /// Trace a `/Length` value to a direct object while guarding
    /// against loops: a reference whose lookup is already underway on
    /// this parser is a recursion error.
    fn trace_stream_length(
        &self,
        stream_number: i64,
        length_obj: &PdfObject,
    ) -> ParseResult<PdfObject> {
        let length_ref = length_obj.as_reference().map(|r| r.object_number);
        if let Some(target) = length_ref {
            let mut in_progress = self.length_refs_in_progress.lock().unwrap();
            if in_progress.contains(&target) {
                return Err(ParseError::Recursion(format!(
                    "stream {stream_number}: Length reference to object {target} is recursive"
                )));
            }
            in_progress.insert(target);
        }

        let result = self.trace(length_obj);

        if let Some(target) = length_ref {
            self.length_refs_in_progress.lock().unwrap().remove(&target);
        }
        result
    }

    /// Replace the xref index with a top-down rebuild and drop every
    /// cache that depends on it.
    fn rebuild_xrefs(&self) -> ParseResult<()> {
        let mut table = {
            let mut src = self.source.lock().unwrap();
            repair::rebuild_xrefs_top_down(&mut src)?
        };
        table.compute_next_offsets(self.file_size);
        *self.xrefs.lock().unwrap() = table;
        self.object_cache.lock().unwrap().clear();
        self.object_streams.lock().unwrap().clear();
        Ok(())
    }
}

/// Envelope identity of a parsed top-level object.
fn envelope_identity(obj: &PdfObject) -> Option<(i64, i64)> {
    match obj {
        PdfObject::Indirect(io) => Some((io.object_number, io.generation)),
        PdfObject::Stream(s) => Some((s.object_number, s.generation)),
        _ => None,
    }
}

/// Locate and load all cross-reference data, newest revision first:
/// find `%%EOF`, extract `startxref`, parse the section there (table or
/// stream), then merge any `XRefStm` hybrid and walk the `Prev` chain.
fn load_xrefs<R: Read + Seek>(
    src: &mut ByteSource<R>,
    xrefs: &mut XrefTable,
    filter: &dyn StreamFilter,
) -> ParseResult<PdfDictionary> {
    let file_size = src.size();

    // The EOF marker must sit in the file's last 1000 bytes.
    let tail_len = file_size.min(1000);
    let tail_start = src.seek_from_end(tail_len)?;
    let tail = src.read_up_to(tail_len as usize)?;
    let eof_pos = tail_start
        + find_last(&tail, b"%%EOF").ok_or_else(|| {
            ParseError::Structural("end of file marker %%EOF not found".to_string())
        })? as u64;

    // startxref within the 64 bytes preceding the marker.
    let sx_start = eof_pos.saturating_sub(64);
    src.seek_to(sx_start)?;
    let window = src.read_up_to((eof_pos - sx_start) as usize)?;
    let mut xref_offset = super::lexer::match_startxref(&window)
        .ok_or_else(|| ParseError::Structural("startxref not found".to_string()))?;

    if xref_offset > file_size {
        log::warn!("startxref offset {xref_offset} is outside the file, attempting repair");
        xref_offset = repair::locate_xref(src, eof_pos)?;
    }

    src.seek_to(xref_offset)?;
    let trailer_dict = parse_xref_section(src, xrefs, filter)?;

    // Hybrid files carry an additional xref stream next to the table.
    if let Some(xref_stm) = trailer_dict.get("XRefStm") {
        let Some(offset) = xref_stm.as_integer() else {
            return Err(ParseError::Structural(
                "trailer XRefStm entry is not an integer".to_string(),
            ));
        };
        src.seek_to(offset as u64)?;
        parse_xref_stream_section(src, xrefs, filter)?;
    }

    // Walk the Prev chain; visited offsets break cycles, and an invalid
    // Prev keeps whatever is loaded rather than failing the open.
    let mut visited: Vec<i64> = Vec::new();
    let mut prev = trailer_dict.get("Prev").cloned();
    while let Some(prev_obj) = prev {
        let Some(offset) = prev_obj.as_integer() else {
            log::warn!("invalid Prev reference (not an integer), ignoring older revisions");
            return Ok(trailer_dict);
        };
        if offset < 0 || visited.contains(&offset) {
            log::debug!("breaking circular or invalid Prev chain at {offset}");
            break;
        }
        visited.push(offset);

        src.seek_to(offset as u64)?;
        match parse_xref_section(src, xrefs, filter) {
            Ok(prev_trailer) => prev = prev_trailer.get("Prev").cloned(),
            Err(err) => {
                log::warn!("failed loading Prev xref section at {offset} ({err}), continuing");
                break;
            }
        }
    }

    Ok(trailer_dict)
}

/// Parse the cross-reference section at the current position: an ASCII
/// table, a cross-reference stream, or (after a localized repair) the
/// nearest table marker.
fn parse_xref_section<R: Read + Seek>(
    src: &mut ByteSource<R>,
    xrefs: &mut XrefTable,
    filter: &dyn StreamFilter,
) -> ParseResult<PdfDictionary> {
    let bb = src.peek(20)?.to_vec();
    if super::lexer::match_object_header(&bb).is_some() {
        log::trace!("xref offset points at an indirect object, parsing as xref stream");
        parse_xref_stream_section(src, xrefs, filter)
    } else if contains(&bb, b"xref") {
        xref::parse_xref_table(src, xrefs)
    } else {
        log::warn!("no xref table or stream at offset {}, seeking marker", src.position());
        repair::seek_xref_marker(src)?;
        xref::parse_xref_table(src, xrefs)
    }
}

/// Parse an xref stream envelope at the current position and merge its
/// records.
fn parse_xref_stream_section<R: Read + Seek>(
    src: &mut ByteSource<R>,
    xrefs: &mut XrefTable,
    filter: &dyn StreamFilter,
) -> ParseResult<PdfDictionary> {
    let obj = objects::parse_indirect_object(src)?;
    let Some(stream) = obj.as_stream() else {
        return Err(ParseError::Structural(
            "xref offset points at a non-stream object".to_string(),
        ));
    };
    xref_stream::load_xref_stream(stream, filter, xrefs)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).rev().find(|&i| haystack[i..i + needle.len()] == *needle)
}
