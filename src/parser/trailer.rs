//! Trailer dictionary accessors
//!
//! The trailer names the document's key objects (ISO 32000-1 Section
//! 7.5.5). Revision chaining (`Prev`, `XRefStm`) is handled during xref
//! loading; this type wraps the newest revision's dictionary.

use super::objects::{PdfDictionary, PdfObject, PdfReference};

/// The newest revision's trailer dictionary.
#[derive(Debug, Clone)]
pub struct PdfTrailer {
    dict: PdfDictionary,
}

impl PdfTrailer {
    pub fn from_dict(dict: PdfDictionary) -> Self {
        Self { dict }
    }

    pub fn dict(&self) -> &PdfDictionary {
        &self.dict
    }

    /// Total number of entries in the file's xref (`Size`).
    pub fn size(&self) -> Option<i64> {
        self.dict.get("Size").and_then(|o| o.as_integer())
    }

    /// Reference to the document catalog.
    pub fn root(&self) -> Option<PdfReference> {
        self.dict.get("Root").and_then(|o| o.as_reference())
    }

    /// Reference to the document information dictionary.
    pub fn info(&self) -> Option<PdfReference> {
        self.dict.get("Info").and_then(|o| o.as_reference())
    }

    /// Reference to the encryption dictionary, when the file is
    /// encrypted and the entry is indirect.
    pub fn encrypt(&self) -> Option<PdfReference> {
        self.dict.get("Encrypt").and_then(|o| o.as_reference())
    }

    pub fn is_encrypted(&self) -> bool {
        self.dict.contains_key("Encrypt")
    }

    /// Byte offset of the previous revision's xref section.
    pub fn prev(&self) -> Option<i64> {
        self.dict.get("Prev").and_then(|o| o.as_integer())
    }

    /// The file identifier array, if present.
    pub fn id(&self) -> Option<&PdfObject> {
        self.dict.get("ID")
    }
}
