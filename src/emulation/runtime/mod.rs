//! The runtime around the interpreter.
//!
//! # Architecture
//!
//! - [`AppDomain`] - owns memory, assemblies and threads, and ticks the scheduler
//! - [`Assembly`] / [`AssemblyCache`] - loaded assemblies, fetched at most once per name
//! - [`ByteSource`] - where assembly bytes come from ([`MemorySource`], [`DirectorySource`])
//! - [`NativeLibrary`] - methods implemented by the host, such as [`ConsoleLibrary`]
//!
//! Loads complete asynchronously through a [`LoadCompletion`]; threads calling into an
//! assembly that is still loading are blocked until the domain drains the completion.

mod appdomain;
mod assembly;
mod console;
mod native;
mod source;

pub use appdomain::{AppDomain, DomainContext, CORLIB};
pub use assembly::{Assembly, AssemblyCache, LoadState};
pub use console::{ConsoleLibrary, ConsoleSink};
pub use native::{native_key, NativeCall, NativeLibrary, NativeMethod, NativeOutcome, NativeRegistry};
pub use source::{ByteSource, DirectorySource, LoadCompletion, MemorySource};
