//! Encryption collaborator traits
//!
//! The parser treats decryption as a post-parse transform: when the
//! trailer carries `/Encrypt`, a caller-supplied factory turns the
//! encryption dictionary into a [`Crypter`], which the resolver then
//! applies to every object not packed in an object stream (members are
//! decrypted wholesale with their container). The algorithms themselves
//! live outside this crate.

use super::objects::{PdfDictionary, PdfObject};
use super::ParseResult;

/// Decrypts resolved objects in place.
pub trait Crypter: Send + Sync {
    /// True when `obj` needs no (further) decryption.
    fn is_decrypted(&self, obj: &PdfObject) -> bool;

    /// Decrypt `obj` in place using its envelope identity.
    fn decrypt(&self, obj: &mut PdfObject, object_number: i64, generation: i64)
        -> ParseResult<()>;

    /// Try a password; true when it grants access.
    fn authenticate(&self, password: &[u8]) -> ParseResult<bool>;
}

/// Builds a [`Crypter`] from the trailer's encryption dictionary.
pub trait CrypterFactory: Send + Sync {
    fn make(
        &self,
        encrypt_dict: &PdfDictionary,
        trailer: &PdfDictionary,
    ) -> ParseResult<Box<dyn Crypter>>;
}
