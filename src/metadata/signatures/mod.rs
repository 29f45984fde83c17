//! Decoding of the compressed signature blobs stored in the `#Blob` heap.
//!
//! Signatures describe the shape of methods, fields, properties and local variables. The runtime
//! decodes them when a method is prepared (to count arguments and lay out locals) and when a
//! call is bound to a native library (the element type bytes of the parameters form the
//! binding key).
//!
//! # Key Components
//!
//! - [`SignatureParser`] - Recursive decoder over a single blob
//! - [`TypeSignature`] - Decoded element type tree
//! - [`SignatureMethod`], [`SignatureField`], [`SignatureProperty`],
//!   [`SignatureLocalVariables`], [`SignatureTypeSpec`], [`SignatureMethodSpec`] - Decoded signatures
//! - [`ELEMENT_TYPE`] - The element type byte values
//!
//! # Examples
//!
//! ```rust
//! use dotrun::metadata::signatures::{parse_method_signature, TypeSignature};
//!
//! // static void WriteLine(long)
//! let method = parse_method_signature(&[0x00, 0x01, 0x01, 0x0A])?;
//! assert!(!method.has_this);
//! assert_eq!(method.return_type.base, TypeSignature::Void);
//! assert_eq!(method.params[0].base.element_type_id(), 10);
//! # Ok::<(), dotrun::Error>(())
//! ```

mod parser;
mod types;

pub use parser::*;
pub use types::*;

use crate::Result;

/// Parse a method signature from a blob
///
/// # Errors
/// Returns an error if the blob is truncated or malformed
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    let mut parser = SignatureParser::new(data);
    parser.parse_method_signature()
}

/// Parse a field signature from a blob
///
/// # Errors
/// Returns an error if the blob is truncated or malformed
pub fn parse_field_signature(data: &[u8]) -> Result<SignatureField> {
    let mut parser = SignatureParser::new(data);
    parser.parse_field_signature()
}

/// Parse a property signature from a blob
///
/// # Errors
/// Returns an error if the blob is truncated or malformed
pub fn parse_property_signature(data: &[u8]) -> Result<SignatureProperty> {
    let mut parser = SignatureParser::new(data);
    parser.parse_property_signature()
}

/// Parse a local variable signature from a blob
///
/// # Errors
/// Returns an error if the blob is truncated or malformed
pub fn parse_local_var_signature(data: &[u8]) -> Result<SignatureLocalVariables> {
    let mut parser = SignatureParser::new(data);
    parser.parse_local_var_signature()
}

/// Parse a type specification from a blob
///
/// # Errors
/// Returns an error if the blob is truncated or malformed
pub fn parse_type_spec_signature(data: &[u8]) -> Result<SignatureTypeSpec> {
    let mut parser = SignatureParser::new(data);
    parser.parse_type_spec_signature()
}

/// Parse a method specification from a blob
///
/// # Errors
/// Returns an error if the blob is truncated or malformed
pub fn parse_method_spec_signature(data: &[u8]) -> Result<SignatureMethodSpec> {
    let mut parser = SignatureParser::new(data);
    parser.parse_method_spec_signature()
}
