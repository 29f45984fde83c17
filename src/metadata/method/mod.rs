//! Method body decoding.
//!
//! A method body starts at the RVA stored in its `MethodDef` row and consists of a tiny or fat
//! header, the IL code and optional extra data sections carrying exception clauses
//! (ECMA-335 II.25.4).
//!
//! # Key Components
//!
//! - [`MethodBody`] - Decoded header, code and clauses
//! - [`ExceptionHandler`] - One decoded exception clause
//! - [`MethodBodyFlags`], [`SectionFlags`], [`ExceptionHandlerFlags`] - Header and clause flags
//! - [`MethodModifiers`], [`MethodImplFlags`] - `MethodDef` row flags
//!
//! # Examples
//!
//! ```rust
//! use dotrun::metadata::method::MethodBody;
//!
//! let body = MethodBody::from(&[0x0A, 0x16, 0x2A])?;
//! assert_eq!(body.code, vec![0x16, 0x2A]);
//! assert_eq!(body.max_stack, 8);
//! # Ok::<(), dotrun::Error>(())
//! ```

mod body;
mod exceptions;
mod types;

pub use body::*;
pub use exceptions::*;
pub use types::*;
