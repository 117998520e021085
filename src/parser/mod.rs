//! PDF file-structure parser
//!
//! Implements the object and file syntax of ISO 32000-1 (PDF 1.7):
//! direct objects (§7.3), the file trailer and cross-reference data
//! (§7.5), compressed object streams (§7.5.7) and cross-reference
//! streams (§7.5.8), with bounded repair of malformed files.

pub mod encryption;
pub mod filters;
pub mod header;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod reader;
pub mod repair;
pub mod source;
pub mod trailer;
pub mod xref;
pub mod xref_stream;


pub use self::objects::PdfObject;
pub use self::reader::PdfParser;

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Parser errors, grouped by kind.
///
/// Structural errors trigger one repair attempt before surfacing; every
/// other kind surfaces immediately to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Underlying I/O failure: short read, failed seek.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed file structure: missing EOF marker or startxref,
    /// unparseable xref data, bad object header.
    #[error("structural error: {0}")]
    Structural(String),

    /// A size or offset exceeding sanity bounds.
    #[error("range check error: {0}")]
    Range(String),

    /// Self-referential or cyclic resolution: recursive stream `Length`,
    /// `Prev` cycle, an object stream containing itself, multi-depth
    /// indirection.
    #[error("recursion error: {0}")]
    Recursion(String),

    /// An object of the wrong type where a specific one is required.
    #[error("type check error: {0}")]
    Semantic(String),

    /// A stream body could not be decoded by the installed filter.
    #[error("stream decode error: {0}")]
    StreamDecode(String),
}

impl ParseError {
    /// True for errors that warrant a one-shot xref rebuild.
    pub fn is_structural(&self) -> bool {
        matches!(self, ParseError::Structural(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_context() {
        let err = ParseError::Structural("object 12 at offset 90: bad header".to_string());
        let msg = err.to_string();
        assert!(msg.contains("object 12"));
        assert!(msg.contains("offset 90"));
    }

    #[test]
    fn test_error_kind_query() {
        assert!(ParseError::Structural("x".into()).is_structural());
        assert!(!ParseError::Range("x".into()).is_structural());
        assert!(!ParseError::Recursion("x".into()).is_structural());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: ParseError = io.into();
        assert!(matches!(err, ParseError::Io(_)));
    }
}
