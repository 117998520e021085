//! Cross-reference streams
//!
//! ISO 32000-1 Section 7.5.8: a binary-packed xref stored as the
//! payload of an indirect stream object. Records are fixed-width
//! big-endian fields described by the `W` array; the stream dictionary
//! doubles as the revision's trailer.

use super::filters::StreamFilter;
use super::objects::{PdfDictionary, PdfStream};
use super::xref::XrefTable;
use super::{ParseError, ParseResult};

/// Maximum accepted `Size`; bounds memory on hostile files.
const MAX_XREF_SIZE: i64 = 8_388_607;

/// Decode a cross-reference stream and merge its entries into `table`
/// under the standard precedence rules. Returns the trailer dictionary
/// (the stream's own dictionary).
pub(crate) fn load_xref_stream(
    stream: &PdfStream,
    filter: &dyn StreamFilter,
    table: &mut XrefTable,
) -> ParseResult<PdfDictionary> {
    let dict = &stream.dict;

    let size = dict
        .get("Size")
        .and_then(|o| o.as_integer())
        .ok_or_else(|| ParseError::Structural("missing Size in xref stream".to_string()))?;
    if size > MAX_XREF_SIZE {
        return Err(ParseError::Range(format!(
            "xref stream Size {size} exceeds limit {MAX_XREF_SIZE}"
        )));
    }

    let widths = parse_widths(dict)?;
    let record_len: usize = widths.iter().sum();
    let decoded = filter.decode(stream)?;

    if record_len == 0 {
        log::debug!("xref stream with zero-width records carries no entries");
        return Ok(dict.clone());
    }
    if decoded.len() % record_len != 0 {
        return Err(ParseError::Structural(format!(
            "xref stream data truncated: {} bytes with {record_len}-byte records",
            decoded.len()
        )));
    }
    let record_count = decoded.len() / record_len;

    let mut numbers = index_object_numbers(dict, size)?;
    if record_count == numbers.len() + 1 {
        // One extra trailing record is a known producer bug; extend the
        // index rather than rejecting the file.
        log::debug!("xref stream carries one extra record, appending object {size}");
        let next = numbers.last().map(|n| n + 1).unwrap_or(0);
        numbers.push(next);
    }
    if record_count != numbers.len() {
        return Err(ParseError::Structural(format!(
            "xref stream record count {} does not match index length {}",
            record_count,
            numbers.len()
        )));
    }

    for (record, &object_number) in decoded.chunks_exact(record_len).zip(numbers.iter()) {
        let mut pos = 0;
        let mut fields = [0u64; 3];
        for (slot, &width) in fields.iter_mut().zip(widths.iter()) {
            *slot = read_field(&record[pos..pos + width]);
            pos += width;
        }
        // A zero-width first field defaults the record type to 1.
        let entry_type = if widths[0] == 0 { 1 } else { fields[0] };
        match entry_type {
            0 => {} // free
            1 => table.insert_offset_entry(object_number, fields[1], fields[2] as i64),
            2 => table.insert_stream_entry(object_number, fields[1] as i64, fields[2] as i64),
            other => {
                // Forward compatibility: unknown types read as null
                // references, so no entry is defined.
                log::debug!(
                    "xref stream entry type {other} for object {object_number}, treating as null"
                );
            }
        }
    }

    Ok(dict.clone())
}

/// The `W` array: exactly three non-negative field widths.
fn parse_widths(dict: &PdfDictionary) -> ParseResult<Vec<usize>> {
    let w = dict
        .get("W")
        .and_then(|o| o.as_array())
        .ok_or_else(|| ParseError::Structural("missing W array in xref stream".to_string()))?;
    if w.len() != 3 {
        return Err(ParseError::Structural(format!(
            "xref stream W array must have 3 elements, found {}",
            w.len()
        )));
    }
    w.iter()
        .map(|o| {
            let v = o
                .as_integer()
                .ok_or_else(|| ParseError::Semantic("xref stream W widths must be integers".to_string()))?;
            if !(0..=8).contains(&v) {
                return Err(ParseError::Range(format!("invalid xref field width {v}")));
            }
            Ok(v as usize)
        })
        .collect()
}

/// Expand the `Index` array (default `[0 Size]`) into the object number
/// of every record, in order.
fn index_object_numbers(dict: &PdfDictionary, size: i64) -> ParseResult<Vec<i64>> {
    let Some(index) = dict.get("Index") else {
        return Ok((0..size).collect());
    };
    let arr = index
        .as_array()
        .ok_or_else(|| ParseError::Semantic("xref stream Index must be an array".to_string()))?;
    if arr.len() % 2 != 0 {
        return Err(ParseError::Range(
            "xref stream Index length must be a multiple of 2".to_string(),
        ));
    }
    let mut numbers = Vec::new();
    for pair in arr.0.chunks(2) {
        let first = pair[0]
            .as_integer()
            .ok_or_else(|| ParseError::Semantic("xref stream Index values must be integers".to_string()))?;
        let count = pair[1]
            .as_integer()
            .ok_or_else(|| ParseError::Semantic("xref stream Index values must be integers".to_string()))?;
        if !(0..=MAX_XREF_SIZE).contains(&first) || !(0..=MAX_XREF_SIZE).contains(&count) {
            return Err(ParseError::Range(format!(
                "xref stream Index subsection [{first} {count}] out of range"
            )));
        }
        numbers.extend(first..first + count);
        if numbers.len() as i64 > MAX_XREF_SIZE {
            return Err(ParseError::Range(
                "xref stream Index describes too many objects".to_string(),
            ));
        }
    }
    Ok(numbers)
}

/// Big-endian integer of `width` bytes; a zero width reads as 0.
fn read_field(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}
