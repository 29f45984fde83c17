//! Metadata parsing for .NET PE files.
//!
//! This module decodes everything the runtime needs from an image according to ECMA-335
//! Partition II: the CLI header, the metadata root and its streams, all metadata tables,
//! signatures and method bodies.
//!
//! # Key Components
//!
//! - [`cilimage`] - The decoded image and its lookup helpers
//! - [`tables`] - Table schemas, index widths and decoded rows
//! - [`streams`] - The `#~`, `#Strings`, `#US`, `#Blob` and `#GUID` streams
//! - [`signatures`] - Method, field, property and local variable signatures
//! - [`method`] - Method body headers, IL code and exception clauses
//! - [`token`] - Metadata tokens
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotrun::metadata::cilimage::CilImage;
//!
//! let image = CilImage::from_file("Fib.exe".as_ref())?;
//! for (table, rows) in image.tables_header().present() {
//!     println!("{:?}: {}", table, rows);
//! }
//! # Ok::<(), dotrun::Error>(())
//! ```

pub mod cilimage;
pub mod cor20header;
pub mod method;
pub mod root;
pub mod signatures;
pub mod streams;
pub mod tables;
pub mod token;
