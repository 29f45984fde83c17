// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]

//! # dotrun
//!
//! A small execution environment for .NET PE assemblies. `dotrun` loads a PE/CLI image,
//! decodes its ECMA-335 metadata and interprets its CIL on top of a hand-built heap allocator,
//! a mark-sweep collector and a cooperative, round-robin thread scheduler.
//!
//! ## Features
//!
//! - **Fail-fast loader** - PE32 headers, CLI header, metadata root, streams and all tables
//! - **Signature decoding** - methods, fields, properties, locals, type and method specs
//! - **Specializing interpreter** - polymorphic instructions cache their operand kind per method
//! - **Green threads** - frames block while an assembly loads and resume once it arrived
//! - **Own memory** - boundary-tag heap, generational handles and a mark-sweep collector
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotrun::prelude::*;
//!
//! let mut domain = AppDomain::new(RuntimeConfig::default(), Box::new(DirectorySource::new(".")))?;
//! let assembly = domain.load_file("Fib.exe".as_ref())?;
//! let thread = domain.run(&assembly)?;
//! domain.run_to_completion()?;
//!
//! if let Some(EmValue::Int32(code)) = domain.exit_value(thread) {
//!     println!("exited with {code}");
//! }
//! # Ok::<(), dotrun::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - PE/COFF container and the byte-level [`Parser`]
//! - [`metadata`] - CLI header, metadata root, streams, tables, signatures and method bodies
//! - [`emulation`] - interpreter, frames, threads, scheduler, memory and the AppDomain
//! - [`config`] - [`config::RuntimeConfig`]
//! - [`Error`] and [`Result`] - error handling

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// PE/COFF container parsing and little-endian byte access.
///
/// [`File`] validates the DOS, COFF and optional headers and maps RVAs to file offsets;
/// [`file::io`] and [`Parser`] provide the bounds-checked primitive reads everything else is
/// built on.
pub mod file;

/// Definitions, parsing and loading of CIL metadata based on ECMA-335.
///
/// # Key Components
///
/// - [`CilImage`] - a fully decoded image and the entry point for execution
/// - [`metadata::cor20header`] - CLI header
/// - [`metadata::root`] - metadata root and stream directory
/// - [`metadata::streams`] - `#Strings`, `#Blob`, `#GUID`, `#US` and the `#~` header
/// - [`metadata::tables`] - all metadata tables and coded indexes
/// - [`metadata::signatures`] - compressed signature decoding
/// - [`metadata::method`] - method bodies and exception clauses
/// - [`metadata::token`] - metadata tokens
pub mod metadata;

/// Execution of CIL code on top of a decoded image.
pub mod emulation;

/// Runtime configuration.
pub mod config;

/// Convenient re-exports of the most commonly used types and traits.
///
/// ```rust,no_run
/// use dotrun::prelude::*;
///
/// let image = CilImage::from_file("Fib.exe".as_ref())?;
/// println!("entry point {}", image.entry_point());
/// # Ok::<(), dotrun::Error>(())
/// ```
pub mod prelude;

/// `dotrun` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotrun` Error type
///
/// The main error type for all operations in this crate. Execution faults are carried as
/// [`Error::Emulation`].
///
/// ```rust,no_run
/// use dotrun::{Error, CilImage};
///
/// match CilImage::from_file(std::path::Path::new("crafted.exe")) {
///     Ok(_) => println!("Loaded successfully"),
///     Err(Error::NotSupported) => println!("File format not supported"),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// A decoded PE/CLI image. See [`metadata::cilimage::CilImage`].
pub use metadata::cilimage::CilImage;

/// The AppDomain running assemblies. See [`emulation::runtime::AppDomain`].
pub use emulation::AppDomain;

/// Tunables of an AppDomain.
pub use config::RuntimeConfig;

/// Raw PE/COFF access.
pub use file::File;

/// Byte cursor used by every decoder of the crate.
pub use file::parser::Parser;
