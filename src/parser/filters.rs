//! Stream filter collaborator
//!
//! Filter decoding is pluggable: the parser core only needs "decoded
//! bytes for this stream" when reading cross-reference streams and
//! object streams. [`StandardFilter`] covers the filters those streams
//! use in practice (`FlateDecode` with optional PNG/TIFF predictors);
//! anything richer can be supplied through [`StreamFilter`].

use super::objects::{PdfDictionary, PdfObject, PdfStream};
use super::{ParseError, ParseResult};
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Applies the filter chain named in a stream dictionary's `/Filter`
/// entry and returns the decoded payload.
pub trait StreamFilter: Send + Sync {
    fn decode(&self, stream: &PdfStream) -> ParseResult<Vec<u8>>;
}

/// Default filter chain implementation.
#[derive(Debug, Default)]
pub struct StandardFilter;

impl StandardFilter {
    pub fn new() -> Self {
        StandardFilter
    }
}

impl StreamFilter for StandardFilter {
    fn decode(&self, stream: &PdfStream) -> ParseResult<Vec<u8>> {
        let dict = &stream.dict;
        let names: Vec<String> = match dict.get("Filter") {
            None => return Ok(stream.data.clone()),
            Some(PdfObject::Name(name)) => vec![name.as_str().to_string()],
            Some(PdfObject::Array(arr)) => arr
                .iter()
                .map(|o| {
                    o.as_name()
                        .map(|n| n.as_str().to_string())
                        .ok_or_else(|| {
                            ParseError::Semantic("Filter array must contain names".to_string())
                        })
                })
                .collect::<ParseResult<_>>()?,
            Some(_) => {
                return Err(ParseError::Semantic(
                    "Filter must be a name or an array of names".to_string(),
                ))
            }
        };

        let mut data = stream.data.clone();
        for (i, name) in names.iter().enumerate() {
            let parms = decode_parms(dict, i);
            data = match name.as_str() {
                "FlateDecode" | "Fl" => {
                    let inflated = decode_flate(&data)?;
                    apply_predictor(inflated, parms)?
                }
                other => {
                    return Err(ParseError::StreamDecode(format!(
                        "filter {other:?} is not supported by the standard filter"
                    )))
                }
            };
        }
        Ok(data)
    }
}

/// Decode parameters for the i-th filter in the chain, from
/// `DecodeParms` (or its `DP` abbreviation).
fn decode_parms(dict: &PdfDictionary, index: usize) -> Option<&PdfDictionary> {
    let parms = dict.get("DecodeParms").or_else(|| dict.get("DP"))?;
    match parms {
        PdfObject::Dictionary(d) if index == 0 => Some(d),
        PdfObject::Array(arr) => match arr.get(index) {
            Some(PdfObject::Dictionary(d)) => Some(d),
            _ => None,
        },
        _ => None,
    }
}

fn decode_flate(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ParseError::StreamDecode(format!("flate decode error: {e}")))?;
    Ok(out)
}

/// Reverse the predictor transformation named in the decode parameters.
/// Predictor 1 is the identity, 2 is the TIFF horizontal differencing
/// predictor, 10..15 are the PNG row filters.
fn apply_predictor(data: Vec<u8>, parms: Option<&PdfDictionary>) -> ParseResult<Vec<u8>> {
    let Some(parms) = parms else { return Ok(data) };
    let predictor = parms
        .get("Predictor")
        .and_then(|o| o.as_integer())
        .unwrap_or(1);
    if predictor == 1 {
        return Ok(data);
    }

    let colors = parms.get("Colors").and_then(|o| o.as_integer()).unwrap_or(1);
    let bits = parms
        .get("BitsPerComponent")
        .and_then(|o| o.as_integer())
        .unwrap_or(8);
    let columns = parms
        .get("Columns")
        .and_then(|o| o.as_integer())
        .unwrap_or(1);
    if colors < 1 || bits < 1 || columns < 1 {
        return Err(ParseError::Range(
            "invalid predictor parameters".to_string(),
        ));
    }
    let bytes_per_pixel = ((colors * bits + 7) / 8).max(1) as usize;
    let row_len = ((colors * bits * columns + 7) / 8) as usize;

    match predictor {
        2 => {
            if bits != 8 {
                return Err(ParseError::StreamDecode(
                    "TIFF predictor requires 8 bits per component".to_string(),
                ));
            }
            let mut out = data;
            for row in out.chunks_mut(row_len) {
                for i in bytes_per_pixel..row.len() {
                    row[i] = row[i].wrapping_add(row[i - bytes_per_pixel]);
                }
            }
            Ok(out)
        }
        10..=15 => png_unpredict(&data, row_len, bytes_per_pixel),
        other => Err(ParseError::StreamDecode(format!(
            "unsupported predictor {other}"
        ))),
    }
}

/// Undo PNG row filters: each row is preceded by a filter-type byte.
fn png_unpredict(data: &[u8], row_len: usize, bpp: usize) -> ParseResult<Vec<u8>> {
    let stride = row_len + 1;
    if stride == 1 || data.len() % stride != 0 {
        return Err(ParseError::StreamDecode(format!(
            "predicted data length {} is not a multiple of row stride {stride}",
            data.len()
        )));
    }
    let mut out: Vec<u8> = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev_row = vec![0u8; row_len];
    for chunk in data.chunks(stride) {
        let filter = chunk[0];
        let mut row = chunk[1..].to_vec();
        match filter {
            0 => {}
            1 => {
                for i in bpp..row_len {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            2 => {
                for i in 0..row_len {
                    row[i] = row[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                    let up = prev_row[i] as u16;
                    row[i] = row[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] as i16 } else { 0 };
                    let up = prev_row[i] as i16;
                    let up_left = if i >= bpp { prev_row[i - bpp] as i16 } else { 0 };
                    let p = left + up - up_left;
                    let pa = (p - left).abs();
                    let pb = (p - up).abs();
                    let pc = (p - up_left).abs();
                    let paeth = if pa <= pb && pa <= pc {
                        left
                    } else if pb <= pc {
                        up
                    } else {
                        up_left
                    };
                    row[i] = row[i].wrapping_add(paeth as u8);
                }
            }
            other => {
                return Err(ParseError::StreamDecode(format!(
                    "invalid PNG row filter {other}"
                )))
            }
        }
        out.extend_from_slice(&row);
        prev_row = row;
    }
    Ok(out)
}
