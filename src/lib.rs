//! # ferropdf
//!
//! A native parser for the PDF file structure (ISO 32000-1, sections 7.3
//! and 7.5): direct objects, indirect objects, cross-reference tables and
//! streams, compressed object streams, incremental-update chains and the
//! trailer dictionary.
//!
//! The crate exposes the logical object graph of a PDF file. It does not
//! interpret content streams, render pages, or implement encryption
//! algorithms; stream filters and decryption are pluggable collaborators
//! (see [`parser::StreamFilter`] and [`parser::Crypter`]).
//!
//! ## Example
//!
//! ```no_run
//! use ferropdf::PdfParser;
//!
//! let parser = PdfParser::open("document.pdf")?;
//! let version = parser.version();
//! println!("PDF {}.{}", version.major, version.minor);
//!
//! let root = parser.trailer().get("Root").cloned().unwrap();
//! let catalog = parser.trace(&root)?;
//! # Ok::<(), ferropdf::ParseError>(())
//! ```
//!
//! Lookups may be issued concurrently from multiple threads over a single
//! parser instance; all interior state is guarded by per-resource locks.

pub mod parser;

pub use parser::encryption::{Crypter, CrypterFactory};
pub use parser::filters::{StandardFilter, StreamFilter};
pub use parser::header::PdfVersion;
pub use parser::objects::{
    PdfArray, PdfDictionary, PdfIndirectObject, PdfName, PdfObject, PdfReference, PdfStream,
    PdfString,
};
pub use parser::reader::{ParseOptions, PdfParser};
pub use parser::xref::{XrefEntry, XrefLocation, XrefTable};
pub use parser::{ParseError, ParseResult};
